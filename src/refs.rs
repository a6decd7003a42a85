/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Dotted value references.
//!
//! `module-name(.label)*` names a value inside a module: the module is
//! loaded globally (or locally with a `./` prefix) and each dotted label
//! indexes one record level deeper.

use crate::bits::Bits;
use crate::loader::Loader;
use crate::value::{record_lookup, Value};
use anyhow::{ensure, Result};
use log::warn;
use std::path::Path;
use std::str::FromStr;

/// A parsed `module(.label)*` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueRef {
    /// Resolve the module relative to the current directory instead of
    /// the global search path.
    pub local: bool,
    pub module: String,
    pub labels: Vec<String>,
}

impl FromStr for ValueRef {
    type Err = anyhow::Error;

    fn from_str(text: &str) -> Result<ValueRef> {
        let (local, rest) = match text.strip_prefix("./") {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let mut parts = rest.split('.');
        let module = parts.next().unwrap_or_default().to_string();
        let labels: Vec<String> = parts.map(str::to_string).collect();
        ensure!(!module.is_empty(), "empty module name in {:?}", text);
        ensure!(
            labels.iter().all(|l| !l.is_empty()),
            "empty label in {:?}",
            text
        );
        Ok(ValueRef {
            local,
            module,
            labels,
        })
    }
}

impl std::fmt::Display for ValueRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.local {
            write!(f, "./")?;
        }
        write!(f, "{}", self.module)?;
        for label in &self.labels {
            write!(f, ".{}", label)?;
        }
        Ok(())
    }
}

impl ValueRef {
    /// Loads the module and follows the dotted labels.
    pub fn resolve(&self, loader: &Loader, local_dir: &Path) -> Option<Value> {
        let mut value = if self.local {
            loader.load_local(local_dir, &self.module)?
        } else {
            loader.load_global(&self.module)?
        };
        for label in &self.labels {
            match record_lookup(&Bits::of_label(label), &value) {
                Some(below) => value = below,
                None => {
                    warn!("{} has no label {}", self, label);
                    return None;
                }
            }
        }
        Some(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_global() {
        let r: ValueRef = "glas-cli-run.main".parse().unwrap();
        assert!(!r.local);
        assert_eq!(r.module, "glas-cli-run");
        assert_eq!(r.labels, ["main"]);
        assert_eq!(r.to_string(), "glas-cli-run.main");
    }

    #[test]
    fn test_parse_local_and_deep() {
        let r: ValueRef = "./pkg.a.b".parse().unwrap();
        assert!(r.local);
        assert_eq!(r.module, "pkg");
        assert_eq!(r.labels, ["a", "b"]);
        assert_eq!(r.to_string(), "./pkg.a.b");
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        assert!("".parse::<ValueRef>().is_err());
        assert!("./".parse::<ValueRef>().is_err());
        assert!("m..x".parse::<ValueRef>().is_err());
        assert!("m.".parse::<ValueRef>().is_err());
    }
}
