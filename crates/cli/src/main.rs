use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;

use canecestry_core::data::{Delimiter, ReadOptions};
use canecestry_core::genetics::{
    check_pedigree, find_ancestors, find_descendants, find_relatives, maternal_line,
    paternal_line, progeny_of_cross, progeny_of_parent, BuildOptions, DataQualityReport,
    HypotheticalCross, KinshipMethod, LineageGraph, PedigreeTable, RelationshipMatrix,
};
use canecestry_core::query::{compute_matrix, MatrixRequest, MatrixResponse, MatrixScope};

#[derive(Parser)]
#[command(name = "canecestry")]
#[command(version)]
#[command(about = "Explore sugarcane pedigrees and build kinship matrices")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PedigreeArgs {
    /// Pedigree file with LineName, MaleParent and FemaleParent columns
    #[arg(short, long)]
    pedigree: String,

    /// Field delimiter of the pedigree file
    #[arg(long, value_enum, default_value_t = DelimiterArg::Auto)]
    delimiter: DelimiterArg,
}

#[derive(Args)]
struct TraversalArgs {
    #[command(flatten)]
    pedigree: PedigreeArgs,

    /// Focal line (repeatable)
    #[arg(short, long, required = true)]
    line: Vec<String>,

    /// Only report generations up to this distance
    #[arg(long)]
    depth: Option<usize>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum DelimiterArg {
    Auto,
    Tab,
    Comma,
}

impl From<DelimiterArg> for Delimiter {
    fn from(arg: DelimiterArg) -> Self {
        match arg {
            DelimiterArg::Auto => Delimiter::Auto,
            DelimiterArg::Tab => Delimiter::Tab,
            DelimiterArg::Comma => Delimiter::Comma,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum MethodArg {
    /// Coancestry matrix, A / 2
    #[value(alias = "polyploid")]
    Coancestry,
    /// Additive relationship matrix
    #[value(alias = "additive")]
    Diploid,
}

impl From<MethodArg> for KinshipMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Coancestry => KinshipMethod::Coancestry,
            MethodArg::Diploid => KinshipMethod::Diploid,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ScopeArg {
    /// Requested lines and all their ancestors
    Ancestors,
    /// Relatives of the requested lines and the ancestors of each
    Relatives,
    /// Exactly the requested lines
    Listed,
}

impl From<ScopeArg> for MatrixScope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::Ancestors => MatrixScope::Ancestors,
            ScopeArg::Relatives => MatrixScope::Relatives,
            ScopeArg::Listed => MatrixScope::Listed,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum Side {
    Maternal,
    Paternal,
}

#[derive(Subcommand)]
enum Commands {
    /// List every recorded ancestor of one or more lines
    Ancestors(TraversalArgs),

    /// List every line descending from one or more lines
    Descendants(TraversalArgs),

    /// List ancestors and descendants of a set of lines together
    Relatives(TraversalArgs),

    /// Build the kinship matrix over a set of lines
    Matrix {
        #[command(flatten)]
        pedigree: PedigreeArgs,

        /// Line to include (repeatable)
        #[arg(short, long)]
        line: Vec<String>,

        /// File with one line name per row ('#' starts a comment)
        #[arg(long)]
        lines_file: Option<String>,

        #[arg(short, long, value_enum, default_value_t = MethodArg::Coancestry)]
        method: MethodArg,

        /// Lines the matrix covers
        #[arg(long, value_enum, default_value_t = ScopeArg::Ancestors)]
        scope: ScopeArg,

        /// Report only these lines of the computed matrix (repeatable)
        #[arg(long)]
        subset: Vec<String>,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<String>,

        /// Give up if the build takes longer than this
        #[arg(long)]
        timeout_secs: Option<u64>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List the progeny of a parent, or of a specific cross
    Progeny {
        #[command(flatten)]
        pedigree: PedigreeArgs,

        #[arg(long)]
        parent: String,

        /// Only progeny of `parent` crossed with this line, in either direction
        #[arg(long)]
        other_parent: Option<String>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Follow the female-only or male-only parent chain of a line
    Lineage {
        #[command(flatten)]
        pedigree: PedigreeArgs,

        #[arg(short, long)]
        line: String,

        #[arg(long, value_enum, default_value_t = Side::Maternal)]
        side: Side,
    },

    /// Report duplicates, unresolved parents and cycles
    Check {
        #[command(flatten)]
        pedigree: PedigreeArgs,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Kinship of a planned cross with its parents
    Preview {
        #[command(flatten)]
        pedigree: PedigreeArgs,

        /// Name for the hypothetical progeny
        #[arg(long)]
        progeny: String,

        #[arg(long)]
        female: String,

        #[arg(long)]
        male: String,

        #[arg(short, long, value_enum, default_value_t = MethodArg::Coancestry)]
        method: MethodArg,
    },

    /// Narrow a previously written matrix file to some of its lines
    Subset {
        /// Matrix file written by `matrix`
        #[arg(long)]
        matrix: String,

        /// Line to keep (repeatable)
        #[arg(short, long, required = true)]
        line: Vec<String>,

        /// Method the matrix was built with
        #[arg(short, long, value_enum, default_value_t = MethodArg::Coancestry)]
        method: MethodArg,

        #[arg(short, long)]
        output: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Ancestors(args) => cmd_traverse(&args, Walk::Ancestors),
        Commands::Descendants(args) => cmd_traverse(&args, Walk::Descendants),
        Commands::Relatives(args) => cmd_traverse(&args, Walk::Relatives),
        Commands::Matrix {
            pedigree,
            line,
            lines_file,
            method,
            scope,
            subset,
            output,
            timeout_secs,
            format,
        } => cmd_matrix(
            &pedigree,
            line,
            lines_file.as_deref(),
            method.into(),
            scope.into(),
            &subset,
            output.as_deref(),
            timeout_secs,
            format,
        ),
        Commands::Progeny {
            pedigree,
            parent,
            other_parent,
            format,
        } => cmd_progeny(&pedigree, &parent, other_parent.as_deref(), format),
        Commands::Lineage {
            pedigree,
            line,
            side,
        } => cmd_lineage(&pedigree, &line, side),
        Commands::Check { pedigree, format } => cmd_check(&pedigree, format),
        Commands::Preview {
            pedigree,
            progeny,
            female,
            male,
            method,
        } => cmd_preview(&pedigree, progeny, female, male, method.into()),
        Commands::Subset {
            matrix,
            line,
            method,
            output,
        } => cmd_subset(&matrix, &line, method.into(), output.as_deref()),
    }
}

fn load_pedigree(args: &PedigreeArgs) -> Result<PedigreeTable> {
    let options = ReadOptions::new().delimiter(args.delimiter.into());
    let table = PedigreeTable::from_path(&args.pedigree, &options)
        .with_context(|| format!("Failed to load pedigree from '{}'", args.pedigree))?;
    eprintln!(
        "Loaded pedigree with {} rows from '{}'",
        table.len(),
        args.pedigree
    );
    Ok(table)
}

/// Write to the given file, or stdout when none is given.
fn open_output(path: Option<&str>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Failed to create '{}'", p))?,
        )),
        None => Box::new(io::stdout().lock()),
    })
}

#[derive(Clone, Copy)]
enum Walk {
    Ancestors,
    Descendants,
    Relatives,
}

fn cmd_traverse(args: &TraversalArgs, walk: Walk) -> Result<()> {
    let table = load_pedigree(&args.pedigree)?;
    let index = table.index();

    let mut graphs: Vec<(String, LineageGraph)> = match walk {
        Walk::Ancestors => args
            .line
            .iter()
            .map(|l| (format!("Ancestors of '{}'", l), find_ancestors(&index, l)))
            .collect(),
        Walk::Descendants => args
            .line
            .iter()
            .map(|l| (format!("Descendants of '{}'", l), find_descendants(&index, l)))
            .collect(),
        Walk::Relatives => vec![(
            format!("Relatives of {}", args.line.join(", ")),
            find_relatives(&index, &args.line),
        )],
    };

    if let Some(depth) = args.depth {
        for (_, graph) in graphs.iter_mut() {
            *graph = graph.within_depth(depth);
        }
    }

    match args.format {
        OutputFormat::Json => {
            let mut body = serde_json::Map::new();
            for (title, graph) in &graphs {
                body.insert(title.clone(), serde_json::to_value(graph)?);
            }
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Text => {
            for (title, graph) in &graphs {
                print_graph(title, graph);
            }
        }
    }
    Ok(())
}

fn print_graph(title: &str, graph: &LineageGraph) {
    println!(
        "{}: {} lines, {} edges",
        title,
        graph.lines.len(),
        graph.edges.len()
    );
    for (generation, lines) in &graph.generations {
        println!("  generation {}: {}", generation, lines.join(", "));
    }
    if !graph.edges.is_empty() {
        println!("  edges:");
        for edge in &graph.edges {
            println!("    {} -> {} ({:?})", edge.parent, edge.child, edge.role);
        }
    }
    println!();
}

fn read_lines_file(path: &str) -> Result<Vec<String>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read lines from '{}'", path))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

#[allow(clippy::too_many_arguments)]
fn cmd_matrix(
    pedigree: &PedigreeArgs,
    mut lines: Vec<String>,
    lines_file: Option<&str>,
    method: KinshipMethod,
    scope: MatrixScope,
    subset: &[String],
    output: Option<&str>,
    timeout_secs: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    if let Some(path) = lines_file {
        lines.extend(read_lines_file(path)?);
    }
    if lines.is_empty() {
        bail!("No lines given. Use --line or --lines-file.");
    }

    let mut request = MatrixRequest::new(&lines)
        .method(method)
        .scope(scope);
    if !subset.is_empty() {
        request = request.subset(subset);
    }

    let table = load_pedigree(pedigree)?;
    let index = table.index();

    let mut options = BuildOptions::new();
    if let Some(secs) = timeout_secs {
        options = options.timeout(Duration::from_secs(secs));
    }

    let matrix = compute_matrix(&index, &request, &options)
        .context("Failed to build relationship matrix")?;
    eprintln!(
        "{} over {} lines",
        matrix.method().label(),
        matrix.len()
    );
    let missing: Vec<String> = lines.iter().filter(|l| !index.contains(l)).cloned().collect();
    if !missing.is_empty() {
        eprintln!("Lines without a pedigree record: {}", missing.join(", "));
    }

    let mut out = open_output(output)?;
    match format {
        OutputFormat::Json => {
            let response = MatrixResponse::from_matrix(&matrix, missing);
            serde_json::to_writer_pretty(&mut out, &response)?;
            writeln!(out)?;
        }
        OutputFormat::Text => matrix.write_delimited(&mut out, b',')?,
    }
    out.flush()?;

    if let Some(path) = output {
        info!("matrix written to '{}'", path);
    }
    Ok(())
}

fn cmd_progeny(
    pedigree: &PedigreeArgs,
    parent: &str,
    other_parent: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let table = load_pedigree(pedigree)?;
    let index = table.index();

    match other_parent {
        Some(other) => {
            let progeny = progeny_of_cross(&index, parent, other);
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&progeny)?),
                OutputFormat::Text => {
                    println!("{} progeny of {} x {}", progeny.len(), parent, other);
                    for rec in progeny {
                        println!("  {}", rec.line_name);
                    }
                }
            }
        }
        None => {
            let progeny = progeny_of_parent(&index, parent);
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&progeny)?),
                OutputFormat::Text => {
                    println!("{} progeny of {}", progeny.len(), parent);
                    for p in progeny {
                        let other = if p.record.male_parent.as_deref() == Some(parent) {
                            p.record.female_parent.as_deref()
                        } else {
                            p.record.male_parent.as_deref()
                        };
                        println!(
                            "  {:<20} as {:?} parent, crossed with {}",
                            p.record.line_name,
                            p.role,
                            other.unwrap_or("unknown")
                        );
                    }
                }
            }
        }
    }
    Ok(())
}

fn cmd_lineage(pedigree: &PedigreeArgs, line: &str, side: Side) -> Result<()> {
    let table = load_pedigree(pedigree)?;
    let index = table.index();
    if !index.contains(line) {
        bail!("Line '{}' is not in the pedigree", line);
    }

    let (label, chain) = match side {
        Side::Maternal => ("Maternal", maternal_line(&index, line)),
        Side::Paternal => ("Paternal", paternal_line(&index, line)),
    };

    println!("{} line of {} ({} generations)", label, line, chain.len());
    for (generation, ancestor) in chain.iter().enumerate() {
        println!("  {}: {}", generation + 1, ancestor);
    }
    Ok(())
}

fn cmd_check(pedigree: &PedigreeArgs, format: OutputFormat) -> Result<()> {
    let table = load_pedigree(pedigree)?;
    let report = check_pedigree(&table.index());

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }
    Ok(())
}

fn print_report(report: &DataQualityReport) {
    println!("Rows:     {}", report.n_rows);
    println!("Lines:    {}", report.n_lines);
    println!("Founders: {}", report.n_founders);

    if report.is_clean() {
        println!("No problems found.");
        return;
    }

    if !report.duplicates.is_empty() {
        println!("\nDuplicate line names (first row kept):");
        for dup in &report.duplicates {
            println!(
                "  {} (row {} kept, row {} ignored)",
                dup.line_name,
                dup.kept_row + 1,
                dup.ignored_row + 1
            );
        }
    }
    if !report.unresolved_parents.is_empty() {
        println!("\nParents without a record (treated as unknown):");
        for u in &report.unresolved_parents {
            println!("  {} -> {:?} parent '{}'", u.line_name, u.role, u.parent);
        }
    }
    if !report.cyclic_lines.is_empty() {
        println!("\nLines on a parent cycle:");
        for line in &report.cyclic_lines {
            println!("  {}", line);
        }
    }
}

fn cmd_preview(
    pedigree: &PedigreeArgs,
    progeny: String,
    female: String,
    male: String,
    method: KinshipMethod,
) -> Result<()> {
    let table = load_pedigree(pedigree)?;
    if table.index().contains(&progeny) {
        bail!("Line '{}' already exists in the pedigree", progeny);
    }

    let cross = HypotheticalCross {
        name: progeny.clone(),
        female_parent: female.clone(),
        male_parent: male.clone(),
    };
    let extended = table.with_hypothetical_progeny(&[cross]);
    let index = extended.index();

    let request = MatrixRequest::new(&[progeny.as_str()]).method(method);
    let matrix = compute_matrix(&index, &request, &BuildOptions::new())
        .context("Failed to build relationship matrix")?;

    print_preview(&matrix, &progeny, &female, &male);
    Ok(())
}

fn print_preview(matrix: &RelationshipMatrix, progeny: &str, female: &str, male: &str) {
    let show = |a: &str, b: &str| {
        matrix
            .get(a, b)
            .map(|v| format!("{:.4}", v))
            .unwrap_or_else(|| "n/a".to_string())
    };

    println!("{} of {} = {} x {}", matrix.method().label(), progeny, female, male);
    println!("  {:<12} {}", "self", show(progeny, progeny));
    println!("  {:<12} {}", "female", show(progeny, female));
    println!("  {:<12} {}", "male", show(progeny, male));
    println!("  {:<12} {}", "parents", show(female, male));
    if let Some(f) = matrix.inbreeding(progeny) {
        println!("  {:<12} {:.4}", "inbreeding", f);
    }
}

fn cmd_subset(
    matrix_path: &str,
    lines: &[String],
    method: KinshipMethod,
    output: Option<&str>,
) -> Result<()> {
    let file =
        File::open(matrix_path).with_context(|| format!("Failed to open '{}'", matrix_path))?;
    let matrix = RelationshipMatrix::read_delimited(file, Delimiter::Auto, method)
        .with_context(|| format!("Failed to read matrix from '{}'", matrix_path))?;

    let sub = matrix
        .extract(lines)
        .context("Failed to extract sub-matrix")?;
    eprintln!("Extracted {0}x{0} from {1}x{1}", sub.len(), matrix.len());

    let mut out = open_output(output)?;
    sub.write_delimited(&mut out, b',')?;
    out.flush()?;
    Ok(())
}
