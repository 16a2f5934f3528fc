pub mod io;

pub use io::{
    Delimiter, ReadOptions, FEMALE_PARENT_COLUMN, LINE_NAME_COLUMN, MALE_PARENT_COLUMN,
};
