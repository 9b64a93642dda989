//! Failing cases found by running generated graphs, and their reduction.
//!
//! A case is a directory:
//!
//! ```text
//! 17/
//!   COMPILE          empty marker naming the failure kind
//!   code.txt         the failing program
//!   error.txt        `opt_level=<n>` on the first line, then the captured error
//!   inputs.npz       optional input tensors
//!   params.npz       optional parameter tensors
//! ```
//!
//! Reduction adds `code-reduced.txt` and, if the reducer has anything to add, `extra.txt`.
//! Case directories under one root are named by integers and processed in numeric order.
use crate::error::{Error, Result};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const CODE_FILE: &str = "code.txt";
pub const ERROR_FILE: &str = "error.txt";
pub const INPUTS_FILE: &str = "inputs.npz";
pub const PARAMS_FILE: &str = "params.npz";
pub const REDUCED_FILE: &str = "code-reduced.txt";
pub const EXTRA_FILE: &str = "extra.txt";

/// Stage at which the system under test failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    Compile,
    Run,
    /// Optimized and reference outputs differ
    Compute,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 3] = [ErrorKind::Compile, ErrorKind::Run, ErrorKind::Compute];

    /// Name of the marker file
    pub fn marker(&self) -> &'static str {
        match self {
            ErrorKind::Compile => "COMPILE",
            ErrorKind::Run => "RUN",
            ErrorKind::Compute => "COMPUTE",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.marker())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    /// Failure kinds marked in the directory, in [`ErrorKind::ALL`] order
    pub kinds: Vec<ErrorKind>,
    pub code: String,
    pub error: String,
    pub opt_level: u32,
    /// Archived tensors are passed to reducers by path, never parsed here
    pub inputs: Option<PathBuf>,
    pub params: Option<PathBuf>,
}

impl Case {
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let code = fs::read_to_string(dir.join(CODE_FILE))?;
        let text = fs::read_to_string(dir.join(ERROR_FILE))?;
        let (first, error) = text.split_once('\n').unwrap_or((text.as_str(), ""));
        let opt_level = parse_opt_level(first).ok_or_else(|| {
            Error::Case(format!(
                "{}: first line of {ERROR_FILE} is not `opt_level=<n>`",
                dir.display()
            ))
        })?;
        let kinds = ErrorKind::ALL
            .into_iter()
            .filter(|k| dir.join(k.marker()).is_file())
            .collect();
        let archive = |name: &str| Some(dir.join(name)).filter(|p| p.is_file());
        Ok(Case {
            kinds,
            code,
            error: error.to_string(),
            opt_level,
            inputs: archive(INPUTS_FILE),
            params: archive(PARAMS_FILE),
        })
    }

    /// Write the case into `dir`, creating it if needed. Archives are copied in.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        for kind in &self.kinds {
            fs::write(dir.join(kind.marker()), "")?;
        }
        fs::write(dir.join(CODE_FILE), &self.code)?;
        fs::write(
            dir.join(ERROR_FILE),
            format!("opt_level={}\n{}", self.opt_level, self.error),
        )?;
        for (src, name) in [(&self.inputs, INPUTS_FILE), (&self.params, PARAMS_FILE)] {
            if let Some(src) = src {
                let dst = dir.join(name);
                if *src != dst {
                    fs::copy(src, dst)?;
                }
            }
        }
        Ok(())
    }
}

fn parse_opt_level(line: &str) -> Option<u32> {
    line.trim().strip_prefix("opt_level=")?.parse().ok()
}

////////////////////////////////////////////////////////////////////////////////
// Reduction

/// Output of a reducer: the minimized program and optional diagnostics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reduction {
    pub code: String,
    pub extra: String,
}

/// Shrinks a failing program while preserving its failure of one kind
pub trait Reducer {
    fn reduce(&mut self, case: &Case, kind: ErrorKind) -> Result<Reduction>;
}

/// Reduce every case directory under `root`, in numeric order. Returns the number of
/// reductions written.
pub fn reduce_cases(root: impl AsRef<Path>, reducer: &mut impl Reducer) -> Result<usize> {
    let mut cases = vec![];
    for entry in fs::read_dir(root.as_ref())? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        match name.to_str().and_then(|s| s.parse::<u64>().ok()) {
            Some(id) => cases.push((id, entry.path())),
            None => log::warn!("skipping non-case directory {}", entry.path().display()),
        }
    }
    cases.sort();

    let mut written = 0;
    for (id, dir) in cases {
        let case = Case::load(&dir)?;
        for kind in &case.kinds {
            log::info!("reducing case {id} ({kind})");
            let reduction = reducer.reduce(&case, *kind)?;
            fs::write(dir.join(REDUCED_FILE), &reduction.code)?;
            if !reduction.extra.is_empty() {
                fs::write(dir.join(EXTRA_FILE), &reduction.extra)?;
            }
            written += 1;
        }
    }
    Ok(written)
}
