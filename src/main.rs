/*
 * SPDX-FileCopyrightText: 2023 Tommaso Fontana
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The glas command line.

use anyhow::{bail, ensure, Context, Result};
use clap::Parser;
use glas::interp::eval;
use glas::loader::Loader;
use glas::prog::{arity, Prog};
use glas::refs::ValueRef;
use glas::value::Value;
use log::debug;
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "glas", version, about = "Runtime for the glas program model.")]
struct Cli {
    /// Write a binary value to standard output.
    #[arg(long, value_name = "VALUE_REF", group = "verb")]
    extract: Option<ValueRef>,

    /// Run a program value; arguments after -- form its initial state.
    #[arg(long, value_name = "VALUE_REF", group = "verb")]
    run: Option<ValueRef>,

    /// Pretty-print a value.
    #[arg(long, value_name = "VALUE_REF", group = "verb")]
    print: Option<ValueRef>,

    /// Print the inferred static arity of a program value.
    #[arg(long, value_name = "VALUE_REF", group = "verb")]
    arity: Option<ValueRef>,

    /// Program arguments, after --.
    #[arg(last = true)]
    args: Vec<String>,
}

/// Rewrites a free verb `glas V args…` into
/// `glas --run glas-cli-V.main -- args…` before clap sees it.
fn rewrite_verb(args: Vec<OsString>) -> Vec<OsString> {
    match args.get(1).and_then(|a| a.to_str()) {
        Some(verb) if !verb.starts_with('-') => {
            let mut out = vec![
                args[0].clone(),
                "--run".into(),
                format!("glas-cli-{}.main", verb).into(),
                "--".into(),
            ];
            out.extend(args[2..].iter().cloned());
            out
        }
        _ => args,
    }
}

fn home_dir() -> PathBuf {
    if let Some(home) = std::env::var_os("GLAS_HOME") {
        return PathBuf::from(home);
    }
    let base = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(base).join(".config").join("glas")
}

pub fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse_from(rewrite_verb(std::env::args_os().collect()));
    let home = home_dir();
    debug!("glas home: {}", home.display());
    let loader = Loader::from_home(&home)?;
    loader.bootstrap().context("g0 bootstrap")?;
    let cwd = std::env::current_dir().context("reading the current directory")?;

    let resolve = |r: &ValueRef| -> Result<Value> {
        r.resolve(&loader, &cwd)
            .with_context(|| format!("{} is not available", r))
    };

    if let Some(r) = &cli.extract {
        let value = resolve(r)?;
        let bytes = value
            .to_binary()
            .with_context(|| format!("{} is not a binary value", r))?;
        std::io::stdout().write_all(&bytes)?;
        return Ok(());
    }
    if let Some(r) = &cli.print {
        println!("{}", resolve(r)?);
        return Ok(());
    }
    if let Some(r) = &cli.arity {
        let prog = Prog::of_value(&resolve(r)?)
            .with_context(|| format!("{} is not a program", r))?;
        println!("{}", arity(&prog)?);
        return Ok(());
    }
    if let Some(r) = &cli.run {
        let prog = Prog::of_value(&resolve(r)?)
            .with_context(|| format!("{} is not a program", r))?;
        arity(&prog).with_context(|| format!("{} fails validation", r))?;
        return run(&prog, &loader, cwd, &cli.args);
    }
    bail!("nothing to do: pass --extract, --run, --print or --arity (see --help)");
}

/// The run loop: the program maps `init:[args…]` through `step:` states
/// until it halts or fails.
fn run(prog: &Prog, loader: &Loader, cwd: PathBuf, args: &[String]) -> Result<()> {
    let mut effects = loader.effects(Some(cwd));
    let mut state = Value::variant(
        "init",
        Value::of_list(args.iter().map(|a| Value::of_text(a))),
    );
    loop {
        let Some(stack) = eval(prog, &mut effects, vec![state]) else {
            bail!("program failed");
        };
        let [result] = <[Value; 1]>::try_from(stack)
            .ok()
            .context("program left a malformed stack")?;
        let Some((label, inner)) = result.as_variant() else {
            bail!("program produced an unrecognized state: {}", result);
        };
        match label.as_str() {
            "step" => state = inner,
            "halt" => {
                let bits = inner
                    .as_bits()
                    .with_context(|| format!("bad halt value: {}", inner))?;
                ensure!(bits.len() <= 32, "halt value beyond 32 bits");
                let code = bits.to_nat().unwrap() as i32;
                std::process::exit(code);
            }
            _ => bail!("program produced an unrecognized state: {}", result),
        }
    }
}
