//! # File IO (Parsing and Writing)
//!
//! It is recommended to parse and write through [`Wcnf`](super::Wcnf)
//! (`from_dimacs_path` / `write_dimacs`) rather than using the submodule
//! functions directly.

use std::{
    fs::File,
    io::{self, BufReader},
    path::Path,
};

pub mod dimacs;

/// Opens a buffered reader for the file at `path`
pub(crate) fn open_read<P: AsRef<Path>>(path: P) -> Result<BufReader<File>, io::Error> {
    Ok(BufReader::new(File::open(path)?))
}
