//! Operation list parsing: each positional argument is either a clip
//! path or a `silence:SECONDS` directive, executed in order.

use std::fmt;
use std::path::PathBuf;

use anyhow::{bail, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Append(PathBuf),
    Silence(f64),
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Append(path) => write!(f, "append {}", path.display()),
            Op::Silence(seconds) => write!(f, "silence {seconds}s"),
        }
    }
}

pub fn parse(raw: &str) -> Result<Op> {
    if let Some(rest) = raw.strip_prefix("silence:") {
        let seconds: f64 = rest
            .parse()
            .map_err(|_| anyhow::anyhow!("unreadable silence duration {rest:?}"))?;
        if !seconds.is_finite() {
            bail!("silence duration must be finite, got {rest:?}");
        }
        return Ok(Op::Silence(seconds));
    }
    Ok(Op::Append(PathBuf::from(raw)))
}
