/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The module loader.
//!
//! A module name resolves to a file on the search path; the file's bytes
//! pass through the chain of languages named by its extensions, outermost
//! extension first, each language being the `compile` program of a
//! `language-<ext>` module evaluated by the interpreter. The loader itself
//! is the effect handler for those evaluations, serving `load:` and `log:`
//! requests, which is how dependency compilation and cycle detection work.
//!
//! g0 closes the loop: the loader starts from a compiler built into the
//! runtime and, when a `language-g0` module is on the search path,
//! recompiles it with itself until the fixed point is confirmed.
//!
//! Loader problems (missing or ambiguous modules, cycles, malformed
//! compiler output) are reported through the log facade and surfaced to
//! callers as `None`, per the error design: only the caller knows whether
//! a missing module is fatal.

use crate::bits::Bits;
use crate::effects::{log_facade_sink, Effects, TxnLogger};
use crate::interp::eval;
use crate::lang::g0;
use crate::prog::{arity, Arity, Prog};
use crate::texttree;
use crate::value::{record_lookup, Value};
use anyhow::{bail, Context, Result};
use log::{debug, error, warn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The reasons a module fails to load; logged, then surfaced as `None`.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("module {0} not found on the search path")]
    NotFound(String),
    #[error("module {0} is ambiguous: {paths}", paths = .1.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "))]
    Ambiguous(String, Vec<PathBuf>),
    #[error("dependency cycle: {}", .0.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(" -> "))]
    Cycle(Vec<PathBuf>),
}

/// The compiler used for `.g0` files.
#[derive(Clone)]
enum G0Compiler {
    /// The native compiler built into the runtime.
    Builtin,
    /// An interpreter-wrapped `compile` program from `language-g0`.
    Program(Prog),
}

/// A module loader over a fixed search path.
///
/// The caches and the g0 compiler slot use interior mutability: the loader
/// is shared immutably with the evaluations it drives, which re-enter it
/// through the effect handler.
pub struct Loader {
    search: Vec<PathBuf>,
    /// Compiled values per canonical file path; failures are cached too.
    cache: RefCell<HashMap<PathBuf, Option<Value>>>,
    /// The stack of files currently being compiled, for cycle detection.
    loading: RefCell<Vec<PathBuf>>,
    g0: RefCell<G0Compiler>,
}

impl Loader {
    /// A loader searching the given directories in order.
    pub fn new(search: Vec<PathBuf>) -> Loader {
        Loader {
            search,
            cache: RefCell::new(HashMap::new()),
            loading: RefCell::new(Vec::new()),
            g0: RefCell::new(G0Compiler::Builtin),
        }
    }

    /// A loader configured from a home directory: `sources.tt` entries of
    /// label `dir` without children contribute directories, resolved
    /// relative to the home. Without a `sources.tt`, the home directory
    /// itself is the search path.
    pub fn from_home(home: &Path) -> Result<Loader> {
        let config = home.join("sources.tt");
        let search = match std::fs::read_to_string(&config) {
            Err(_) => {
                debug!(
                    "no {} found, searching {} itself",
                    config.display(),
                    home.display()
                );
                vec![home.to_path_buf()]
            }
            Ok(text) => {
                let entries = texttree::parse(&text)
                    .with_context(|| format!("parsing {}", config.display()))?;
                entries
                    .iter()
                    .filter(|e| e.label == "dir" && e.children.is_empty())
                    .map(|e| home.join(&e.data))
                    .collect()
            }
        };
        Ok(Loader::new(search))
    }

    /// The effect handler of this loader: `load:` requests resolve against
    /// the loader, `log:` requests go to a transactional logger over the
    /// log facade, anything else is unrecognized.
    pub fn effects(&self, local_dir: Option<PathBuf>) -> LoaderEff<'_> {
        LoaderEff {
            loader: self,
            local_dir,
            logger: TxnLogger::new(log_facade_sink),
        }
    }

    /// Confirms the g0 bootstrap fixed point when a `language-g0` module
    /// is on the search path; without one the builtin compiler stays.
    pub fn bootstrap(&self) -> Result<()> {
        let Some(m0) = self.load_global("language-g0") else {
            debug!("no language-g0 module, keeping the builtin g0 compiler");
            return Ok(());
        };
        let p0v = compile_field(&m0)?;
        let p0 = checked_compiler(&p0v)?;
        // Recompile language-g0 under its own compiler.
        self.cache.borrow_mut().clear();
        *self.g0.borrow_mut() = G0Compiler::Program(p0);
        let Some(m1) = self.load_global("language-g0") else {
            bail!("language-g0 does not compile under its own compiler");
        };
        let p1v = compile_field(&m1)?;
        if p1v != p0v {
            bail!("g0 bootstrap did not reach a fixed point");
        }
        // Sanity pass: the fixed-point compiler must reproduce itself.
        let p1 = checked_compiler(&p1v)?;
        self.cache.borrow_mut().clear();
        *self.g0.borrow_mut() = G0Compiler::Program(p1);
        let Some(m2) = self.load_global("language-g0") else {
            bail!("bootstrapped g0 compiler fails on its own source");
        };
        if compile_field(&m2)? != p1v {
            bail!("bootstrapped g0 compiler is not a fixed point");
        }
        debug!("g0 bootstrap fixed point confirmed");
        Ok(())
    }

    /// Loads a module from the configured search path.
    pub fn load_global(&self, name: &str) -> Option<Value> {
        for dir in &self.search {
            match resolve_in_dir(dir, name) {
                Resolution::NotFound => continue,
                Resolution::One(path) => return self.load_file(&path),
                Resolution::Many(candidates) => {
                    warn!("{}", LoadError::Ambiguous(name.to_string(), candidates));
                    return None;
                }
            }
        }
        warn!("{}", LoadError::NotFound(name.to_string()));
        None
    }

    /// Loads a module relative to a directory (the folder of the file
    /// being compiled).
    pub fn load_local(&self, dir: &Path, name: &str) -> Option<Value> {
        match resolve_in_dir(dir, name) {
            Resolution::NotFound => {
                warn!(
                    "{} (searched locally in {})",
                    LoadError::NotFound(name.to_string()),
                    dir.display()
                );
                None
            }
            Resolution::One(path) => self.load_file(&path),
            Resolution::Many(candidates) => {
                warn!("{}", LoadError::Ambiguous(name.to_string(), candidates));
                None
            }
        }
    }

    /// Reads and compiles one file, caching per canonical path.
    pub fn load_file(&self, path: &Path) -> Option<Value> {
        let canonical = match path.canonicalize() {
            Ok(canonical) => canonical,
            Err(err) => {
                error!("cannot resolve {}: {}", path.display(), err);
                return None;
            }
        };
        if let Some(cached) = self.cache.borrow().get(&canonical) {
            return cached.clone();
        }
        if self.loading.borrow().contains(&canonical) {
            let mut chain = self.loading.borrow().clone();
            chain.push(canonical);
            error!("{}", LoadError::Cycle(chain));
            // Not cached: the file may still compile once the enclosing
            // load completes.
            return None;
        }
        self.loading.borrow_mut().push(canonical.clone());
        let result = match self.compile_path(&canonical) {
            Ok(value) => Some(value),
            Err(err) => {
                error!("loading {}: {:#}", canonical.display(), err);
                None
            }
        };
        self.loading.borrow_mut().pop();
        self.cache.borrow_mut().insert(canonical, result.clone());
        result
    }

    fn compile_path(&self, path: &Path) -> Result<Value> {
        let bytes =
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let mut value = Value::of_binary(&bytes);
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .context("file name is not UTF-8")?;
        // Apply the language chain, outermost extension first.
        let exts: Vec<&str> = name.split('.').skip(1).collect();
        for ext in exts.into_iter().rev() {
            value = self
                .apply_language(ext, value, dir)
                .with_context(|| format!("applying language {}", ext))?;
        }
        Ok(value)
    }

    fn apply_language(&self, ext: &str, input: Value, dir: &Path) -> Result<Value> {
        if ext == "g0" {
            let compiler = self.g0.borrow().clone();
            return match compiler {
                G0Compiler::Builtin => {
                    let bytes = input.to_binary().context("g0 input is not a binary")?;
                    g0::compile(&bytes, &mut self.effects(Some(dir.to_path_buf())))
                }
                G0Compiler::Program(prog) => self.run_compiler(&prog, input, dir),
            };
        }
        let module_name = format!("language-{}", ext);
        let Some(module) = self.load_global(&module_name) else {
            warn!("no {} module, passing value through", module_name);
            return Ok(input);
        };
        let prog = checked_compiler(&compile_field(&module)?)
            .with_context(|| format!("in module {}", module_name))?;
        self.run_compiler(&prog, input, dir)
    }

    /// Evaluates a language's `compile` program on one input value.
    fn run_compiler(&self, prog: &Prog, input: Value, dir: &Path) -> Result<Value> {
        let mut effects = self.effects(Some(dir.to_path_buf()));
        let Some(stack) = eval(prog, &mut effects, vec![input]) else {
            bail!("compile program failed");
        };
        let [output] = <[Value; 1]>::try_from(stack)
            .ok()
            .context("compile program left a malformed stack")?;
        Ok(output)
    }
}

/// Extracts the `compile` field of a language module.
fn compile_field(module: &Value) -> Result<Value> {
    record_lookup(&Bits::of_label("compile"), module)
        .context("language module has no compile field")
}

/// Validates a compile program: it must parse and have static arity at
/// most 1 in, at most 1 out.
fn checked_compiler(value: &Value) -> Result<Prog> {
    let prog = Prog::of_value(value).context("compile field is not a program")?;
    match arity(&prog)? {
        Arity::Static(i, o) if i <= 1 && o <= 1 => Ok(prog),
        other => bail!("compile program must be at most 1--1, inferred {}", other),
    }
}

enum Resolution {
    NotFound,
    One(PathBuf),
    Many(Vec<PathBuf>),
}

/// Module resolution in one directory: files whose name before the first
/// dot is the module name, or `public.*` files inside a subdirectory of
/// the module name.
fn resolve_in_dir(dir: &Path, name: &str) -> Resolution {
    let mut candidates = files_with_stem(dir, name);
    let package = dir.join(name);
    if package.is_dir() {
        candidates.extend(files_with_stem(&package, "public"));
    }
    candidates.sort();
    match candidates.len() {
        0 => Resolution::NotFound,
        1 => Resolution::One(candidates.pop().unwrap()),
        _ => Resolution::Many(candidates),
    }
}

fn files_with_stem(dir: &Path, stem: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter(|e| e.path().is_file())
        .filter(|e| {
            e.file_name()
                .to_str()
                .is_some_and(|n| n.split('.').next() == Some(stem))
        })
        .map(|e| e.path())
        .collect()
}

/// The loader's effect handler: intercepts `load:local:`, `load:global:`
/// and `log:` requests; everything else is unrecognized.
pub struct LoaderEff<'a> {
    loader: &'a Loader,
    local_dir: Option<PathBuf>,
    logger: TxnLogger<fn(Value)>,
}

impl Effects for LoaderEff<'_> {
    fn txn_begin(&mut self) {
        self.logger.txn_begin();
    }

    fn txn_commit(&mut self) {
        self.logger.txn_commit();
    }

    fn txn_abort(&mut self) {
        self.logger.txn_abort();
    }

    fn effect(&mut self, request: &Value) -> Option<Value> {
        let (label, inner) = request.as_variant()?;
        match label.as_str() {
            "log" => self.logger.effect(request),
            "load" => {
                let (scope, name) = inner.as_variant()?;
                let name = name.to_text()?;
                match scope.as_str() {
                    "global" => self.loader.load_global(&name),
                    "local" => {
                        let dir = self.local_dir.clone()?;
                        self.loader.load_local(&dir, &name)
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}
