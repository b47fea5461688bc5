//! # dexlens
//!
//! A library for reading Android DEX and ODEX files and building
//! cross-reference analysis over them.
//!
//! ```no_run
//!  use dexlens::analysis::Analysis;
//!  use dexlens::dex::DexFile;
//!
//!  let bytes = std::fs::read("classes.dex").unwrap();
//!  let mut analysis = Analysis::new();
//!  analysis.add(DexFile::load(&bytes).unwrap());
//!  let analysis = analysis.create_xref();
//!  for m in analysis.find_methods("Lcom/example/.*", ".*", ".*", ".*", true).unwrap() {
//!      println!("{} is called from {} places", m.full_name(), m.get_xref_from().len());
//!  }
//! ```
//!

pub mod analysis;
pub mod config;
pub mod dex;
#[cfg(test)]
mod tests;

pub use crate::analysis::Analysis;
pub use crate::config::Config;
pub use crate::dex::{DexError, DexFile, OdexFile};
