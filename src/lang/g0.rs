/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The built-in g0 front end.
//!
//! g0 is the bootstrap language: a Forth-flavored surface over the program
//! model, just rich enough to write language modules in. A file is a
//! sequence of `open`/`from … import …` directives and `prog`/`data`
//! definitions; bodies compose operator words, previously defined words
//! (included by value), literals, and the `dip`/`cond`/`loop`/`env`
//! combinators applied to block literals. The compiled module is a record
//! mapping each defined name to its program or data value.
//!
//! Imports are resolved through the effect handler with `load:global:` and
//! `load:local:` requests, so the loader drives dependency compilation and
//! cycle detection.

use crate::effects::{Effects, NoEffects};
use crate::interp::eval;
use crate::prog::{arity, Arity, Op, Prog};
use crate::value::{record_entries, record_insert, record_lookup, Value};
use anyhow::{bail, Context, Result};
use std::collections::HashMap;

use crate::bits::Bits;

const KEYWORDS: &[&str] = &[
    "open", "from", "import", "as", "prog", "data", "dip", "cond", "loop", "env",
];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Nat(u64),
    Text(String),
    Quote(String),
    Open,
    Close,
    Comma,
}

struct Lexed {
    token: Token,
    line: usize,
}

fn is_word_start(c: char) -> bool {
    c.is_ascii_lowercase()
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'
}

fn lex(source: &str) -> Result<Vec<Lexed>> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut chars = source.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                        break;
                    }
                }
            }
            '[' => {
                chars.next();
                tokens.push(Lexed {
                    token: Token::Open,
                    line,
                });
            }
            ']' => {
                chars.next();
                tokens.push(Lexed {
                    token: Token::Close,
                    line,
                });
            }
            ',' => {
                chars.next();
                tokens.push(Lexed {
                    token: Token::Comma,
                    line,
                });
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        None => bail!("line {}: unterminated string", line),
                        Some('"') => break,
                        Some(c) if c == '\n' || c.is_control() => {
                            bail!("line {}: control character in string", line)
                        }
                        Some(c) => text.push(c),
                    }
                }
                tokens.push(Lexed {
                    token: Token::Text(text),
                    line,
                });
            }
            '\'' => {
                chars.next();
                let word = lex_word(&mut chars)
                    .with_context(|| format!("line {}: bad symbol", line))?;
                tokens.push(Lexed {
                    token: Token::Quote(word),
                    line,
                });
            }
            c if c.is_ascii_digit() => {
                let mut text = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() {
                        text.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = if let Some(hex) = text.strip_prefix("0x") {
                    u64::from_str_radix(hex, 16)
                } else if let Some(bin) = text.strip_prefix("0b") {
                    u64::from_str_radix(bin, 2)
                } else {
                    text.parse()
                };
                let value =
                    value.with_context(|| format!("line {}: bad number {}", line, text))?;
                tokens.push(Lexed {
                    token: Token::Nat(value),
                    line,
                });
            }
            '.' => {
                // A local module reference: "./name".
                chars.next();
                if chars.next() != Some('/') {
                    bail!("line {}: expected ./ module prefix", line);
                }
                let word = lex_word(&mut chars)
                    .with_context(|| format!("line {}: bad module name", line))?;
                tokens.push(Lexed {
                    token: Token::Word(format!("./{}", word)),
                    line,
                });
            }
            c if is_word_start(c) => {
                let word = lex_word(&mut chars).unwrap();
                tokens.push(Lexed {
                    token: Token::Word(word),
                    line,
                });
            }
            other => bail!("line {}: unexpected character {:?}", line, other),
        }
    }
    Ok(tokens)
}

fn lex_word(chars: &mut std::iter::Peekable<std::str::Chars>) -> Result<String> {
    let mut word = String::new();
    match chars.peek() {
        Some(&c) if is_word_start(c) => {
            word.push(c);
            chars.next();
        }
        _ => bail!("expected a word"),
    }
    while let Some(&c) = chars.peek() {
        if is_word_char(c) {
            word.push(c);
            chars.next();
        } else {
            break;
        }
    }
    Ok(word)
}

/// A name bound in the dictionary: a callable word or a data value.
#[derive(Clone)]
enum Binding {
    Word(Prog),
    Data(Value),
}

/// Imported record entries become words when their value parses as a
/// program, data otherwise.
fn bind_import(value: &Value) -> Binding {
    match Prog::of_value(value) {
        Ok(prog) => Binding::Word(prog),
        Err(_) => Binding::Data(value.clone()),
    }
}

/// An item compiled from a body: block literals stay distinguishable so
/// the combinators can consume them statically.
enum Item {
    Plain(Prog),
    Block(Prog),
}

struct Compiler<'e> {
    dict: HashMap<String, Binding>,
    /// Exported definitions in order of appearance.
    defs: Vec<(String, Value)>,
    effects: &'e mut dyn Effects,
}

/// Compiles a g0 source file to its module record.
pub fn compile(source: &[u8], effects: &mut dyn Effects) -> Result<Value> {
    let text = std::str::from_utf8(source).context("g0 source is not UTF-8")?;
    let tokens = lex(text)?;
    let mut compiler = Compiler {
        dict: HashMap::new(),
        defs: Vec::new(),
        effects,
    };
    compiler.compile_toplevel(&tokens)?;
    let mut module = Value::unit();
    for (name, value) in &compiler.defs {
        module = record_insert(&Bits::of_label(name), value.clone(), &module);
    }
    Ok(module)
}

impl Compiler<'_> {
    fn compile_toplevel(&mut self, tokens: &[Lexed]) -> Result<()> {
        let mut pos = 0;
        while pos < tokens.len() {
            let Lexed { token, line } = &tokens[pos];
            let Token::Word(word) = token else {
                bail!("line {}: expected a top-level directive", line);
            };
            pos += 1;
            match word.as_str() {
                "open" => {
                    let name = self.expect_module_name(tokens, &mut pos)?;
                    let module = self.load_module(&name)?;
                    let entries = record_entries(&module)
                        .with_context(|| format!("module {} is not a record", name))?;
                    for (label, value) in entries {
                        self.dict.insert(label, bind_import(&value));
                    }
                }
                "from" => {
                    let name = self.expect_module_name(tokens, &mut pos)?;
                    self.expect_keyword(tokens, &mut pos, "import")?;
                    let module = self.load_module(&name)?;
                    loop {
                        let item = self.expect_word(tokens, &mut pos)?;
                        let value = record_lookup(&Bits::of_label(&item), &module)
                            .with_context(|| {
                                format!("module {} has no definition {}", name, item)
                            })?;
                        let alias = if self.peek_keyword(tokens, pos, "as") {
                            pos += 1;
                            self.expect_word(tokens, &mut pos)?
                        } else {
                            item.clone()
                        };
                        self.dict.insert(alias, bind_import(&value));
                        if matches!(tokens.get(pos).map(|l| &l.token), Some(Token::Comma)) {
                            pos += 1;
                        } else {
                            break;
                        }
                    }
                }
                "prog" => {
                    let name = self.expect_def_name(tokens, &mut pos)?;
                    let body = self.expect_block(tokens, &mut pos)?;
                    self.dict.insert(name.clone(), Binding::Word(body.clone()));
                    self.defs.push((name, body.to_value()));
                }
                "data" => {
                    let name = self.expect_def_name(tokens, &mut pos)?;
                    let body = self.expect_block(tokens, &mut pos)?;
                    match arity(&body).with_context(|| format!("in data {}", name))? {
                        Arity::Static(0, 1) => {}
                        other => bail!(
                            "data {} body must be 0--1, inferred {}",
                            name,
                            other
                        ),
                    }
                    let stack = eval(&body, &mut NoEffects, Vec::new())
                        .with_context(|| format!("data {} body failed", name))?;
                    let [value] = <[Value; 1]>::try_from(stack)
                        .ok()
                        .with_context(|| format!("data {} body left a bad stack", name))?;
                    self.dict
                        .insert(name.clone(), Binding::Data(value.clone()));
                    self.defs.push((name, value));
                }
                other => bail!("line {}: unexpected directive {}", line, other),
            }
        }
        Ok(())
    }

    fn load_module(&mut self, name: &str) -> Result<Value> {
        let request = match name.strip_prefix("./") {
            Some(local) => Value::variant(
                "load",
                Value::variant("local", Value::of_text(local)),
            ),
            None => Value::variant(
                "load",
                Value::variant("global", Value::of_text(name)),
            ),
        };
        self.effects
            .effect(&request)
            .with_context(|| format!("module {} is not available", name))
    }

    fn expect_word(&self, tokens: &[Lexed], pos: &mut usize) -> Result<String> {
        match tokens.get(*pos) {
            Some(Lexed {
                token: Token::Word(word),
                ..
            }) => {
                *pos += 1;
                Ok(word.clone())
            }
            Some(Lexed { line, .. }) => bail!("line {}: expected a word", line),
            None => bail!("unexpected end of file"),
        }
    }

    fn expect_module_name(&self, tokens: &[Lexed], pos: &mut usize) -> Result<String> {
        let name = self.expect_word(tokens, pos)?;
        if KEYWORDS.contains(&name.as_str()) {
            bail!("{} is not a module name", name);
        }
        Ok(name)
    }

    fn expect_def_name(&self, tokens: &[Lexed], pos: &mut usize) -> Result<String> {
        let line = tokens.get(*pos).map(|l| l.line).unwrap_or(0);
        let name = self.expect_word(tokens, pos)?;
        if KEYWORDS.contains(&name.as_str()) || Op::of_label(&name).is_some() {
            bail!("line {}: {} is a reserved word", line, name);
        }
        if name.starts_with("./") {
            bail!("line {}: {} is not a definition name", line, name);
        }
        if self.defs.iter().any(|(n, _)| *n == name) {
            bail!("line {}: {} is defined twice", line, name);
        }
        Ok(name)
    }

    fn expect_keyword(&self, tokens: &[Lexed], pos: &mut usize, kw: &str) -> Result<()> {
        let word = self.expect_word(tokens, pos)?;
        if word != kw {
            bail!("expected {}, found {}", kw, word);
        }
        Ok(())
    }

    fn peek_keyword(&self, tokens: &[Lexed], pos: usize, kw: &str) -> bool {
        matches!(tokens.get(pos).map(|l| &l.token), Some(Token::Word(w)) if w == kw)
    }

    fn expect_block(&mut self, tokens: &[Lexed], pos: &mut usize) -> Result<Prog> {
        match tokens.get(*pos) {
            Some(Lexed {
                token: Token::Open, ..
            }) => {
                *pos += 1;
                self.compile_block(tokens, pos)
            }
            Some(Lexed { line, .. }) => bail!("line {}: expected [", line),
            None => bail!("unexpected end of file, expected ["),
        }
    }

    /// Compiles a body up to the closing bracket.
    fn compile_block(&mut self, tokens: &[Lexed], pos: &mut usize) -> Result<Prog> {
        let mut items: Vec<Item> = Vec::new();
        loop {
            let Some(Lexed { token, line }) = tokens.get(*pos) else {
                bail!("unexpected end of file in a block");
            };
            let line = *line;
            *pos += 1;
            match token {
                Token::Close => break,
                Token::Open => {
                    let block = self.compile_block(tokens, pos)?;
                    items.push(Item::Block(block));
                }
                Token::Nat(n) => items.push(Item::Plain(Prog::Data(Value::of_nat(*n)))),
                Token::Text(text) => {
                    items.push(Item::Plain(Prog::Data(Value::of_text(text))))
                }
                Token::Quote(word) => {
                    items.push(Item::Plain(Prog::Data(Value::symbol(word))))
                }
                Token::Comma => bail!("line {}: stray comma in a block", line),
                Token::Word(word) => match word.as_str() {
                    "dip" => {
                        let body = pop_blocks::<1>(&mut items, line, "dip")?;
                        let [p] = body;
                        items.push(Item::Plain(Prog::Dip(Box::new(p))));
                    }
                    "cond" => {
                        let [try_, then_, else_] = pop_blocks::<3>(&mut items, line, "cond")?;
                        items.push(Item::Plain(Prog::Cond {
                            try_: Box::new(try_),
                            then_: Box::new(then_),
                            else_: Box::new(else_),
                        }));
                    }
                    "loop" => {
                        let [while_, do_] = pop_blocks::<2>(&mut items, line, "loop")?;
                        items.push(Item::Plain(Prog::Loop {
                            while_: Box::new(while_),
                            do_: Box::new(do_),
                        }));
                    }
                    "env" => {
                        let [with_, do_] = pop_blocks::<2>(&mut items, line, "env")?;
                        items.push(Item::Plain(Prog::Env {
                            with_: Box::new(with_),
                            do_: Box::new(do_),
                        }));
                    }
                    _ => {
                        if let Some(op) = Op::of_label(word) {
                            items.push(Item::Plain(Prog::Op(op)));
                        } else if let Some(binding) = self.dict.get(word) {
                            items.push(Item::Plain(match binding {
                                Binding::Word(prog) => prog.clone(),
                                Binding::Data(value) => Prog::Data(value.clone()),
                            }));
                        } else {
                            bail!("line {}: undefined word {}", line, word);
                        }
                    }
                },
            }
        }
        let mut progs: Vec<Prog> = items
            .into_iter()
            .map(|item| match item {
                Item::Plain(p) => p,
                // A block not consumed by a combinator is program data.
                Item::Block(p) => Prog::Data(p.to_value()),
            })
            .collect();
        Ok(if progs.len() == 1 {
            progs.pop().unwrap()
        } else {
            Prog::Seq(progs)
        })
    }
}

/// Pops the last `N` items, which must all be block literals, in stack
/// order (deepest first).
fn pop_blocks<const N: usize>(
    items: &mut Vec<Item>,
    line: usize,
    combinator: &str,
) -> Result<[Prog; N]> {
    if items.len() < N {
        bail!(
            "line {}: {} needs {} preceding blocks",
            line,
            combinator,
            N
        );
    }
    let tail = items.split_off(items.len() - N);
    let mut out = Vec::with_capacity(N);
    for item in tail {
        match item {
            Item::Block(p) => out.push(p),
            Item::Plain(_) => bail!(
                "line {}: {} applies to block literals only",
                line,
                combinator
            ),
        }
    }
    Ok(<[Prog; N]>::try_from(out).ok().unwrap())
}

#[cfg(test)]
mod test {
    use super::*;

    fn compile_str(src: &str) -> Result<Value> {
        compile(src.as_bytes(), &mut NoEffects)
    }

    fn field(module: &Value, name: &str) -> Value {
        record_lookup(&Bits::of_label(name), module).expect(name)
    }

    #[test]
    fn test_simple_prog() {
        let module = compile_str("prog double [ copy add ]").unwrap();
        let prog = Prog::of_value(&field(&module, "double")).unwrap();
        assert_eq!(prog, Prog::Seq(vec![Prog::Op(Op::Copy), Prog::Op(Op::Add)]));
    }

    #[test]
    fn test_literals() {
        let src = r#"
            # all the literal forms
            prog main [ 42 0x2a 0b101010 "hi" 'go ]
        "#;
        let module = compile_str(src).unwrap();
        let prog = Prog::of_value(&field(&module, "main")).unwrap();
        let Prog::Seq(items) = prog else { panic!("expected seq") };
        assert_eq!(items[0], Prog::Data(Value::of_nat(42)));
        assert_eq!(items[1], Prog::Data(Value::of_nat(42)));
        assert_eq!(items[2], Prog::Data(Value::of_nat(42)));
        assert_eq!(items[3], Prog::Data(Value::of_text("hi")));
        assert_eq!(items[4], Prog::Data(Value::symbol("go")));
    }

    #[test]
    fn test_combinators_take_blocks() {
        let src = "prog main [ [ copy ] [ drop ] [ swap ] cond [ copy ] dip ]";
        let module = compile_str(src).unwrap();
        let prog = Prog::of_value(&field(&module, "main")).unwrap();
        let Prog::Seq(items) = prog else { panic!("expected seq") };
        assert!(matches!(items[0], Prog::Cond { .. }));
        assert!(matches!(items[1], Prog::Dip(_)));
        // Blocks must be literal.
        assert!(compile_str("prog main [ copy dip ]").is_err());
        assert!(compile_str("prog main [ [ copy ] cond ]").is_err());
    }

    #[test]
    fn test_unconsumed_block_is_data() {
        let module = compile_str("prog main [ [ copy ] ]").unwrap();
        let prog = Prog::of_value(&field(&module, "main")).unwrap();
        match prog {
            Prog::Data(v) => {
                assert_eq!(Prog::of_value(&v).unwrap(), Prog::Op(Op::Copy));
            }
            other => panic!("expected data, got {:?}", other),
        }
    }

    #[test]
    fn test_words_compile_by_inclusion() {
        let src = "prog dup2 [ copy copy ]\nprog main [ dup2 drop ]";
        let module = compile_str(src).unwrap();
        let main = Prog::of_value(&field(&module, "main")).unwrap();
        let Prog::Seq(items) = main else { panic!("expected seq") };
        assert_eq!(
            items[0],
            Prog::Seq(vec![Prog::Op(Op::Copy), Prog::Op(Op::Copy)])
        );
    }

    #[test]
    fn test_data_definitions_evaluate() {
        let src = "data answer [ 40 2 add drop ]\nprog main [ answer ]";
        // 40 (6 bits) + 2 (2 bits): sum keeps 6 bits = 42, carry dropped.
        let module = compile_str(src).unwrap();
        assert_eq!(field(&module, "answer"), Value::of_nat(42));
        let main = Prog::of_value(&field(&module, "main")).unwrap();
        assert_eq!(main, Prog::Data(Value::of_nat(42)));
        // A non-0--1 data body is rejected.
        assert!(compile_str("data bad [ copy ]").is_err());
    }

    #[test]
    fn test_reserved_and_duplicate_names() {
        assert!(compile_str("prog copy [ swap ]").is_err());
        assert!(compile_str("prog open [ swap ]").is_err());
        assert!(compile_str("prog a [ swap ]\nprog a [ copy ]").is_err());
        assert!(compile_str("prog main [ undefined-word ]").is_err());
    }

    #[test]
    fn test_imports_via_effects() {
        // A handler serving one module with a couple of definitions.
        struct OneModule(Value);
        impl Effects for OneModule {
            fn txn_begin(&mut self) {}
            fn txn_commit(&mut self) {}
            fn txn_abort(&mut self) {}
            fn effect(&mut self, request: &Value) -> Option<Value> {
                let (label, inner) = request.as_variant()?;
                if label != "load" {
                    return None;
                }
                let (scope, name) = inner.as_variant()?;
                if scope == "global" && name.to_text()? == "prelude" {
                    Some(self.0.clone())
                } else {
                    None
                }
            }
        }
        let prelude = compile_str("prog dup2 [ copy copy ]\ndata zero [ 0 ]").unwrap();
        let mut handler = OneModule(prelude);
        let src = "from prelude import dup2 as d2, zero\nprog main [ zero d2 ]";
        let module = compile(src.as_bytes(), &mut handler).unwrap();
        let main = Prog::of_value(&field(&module, "main")).unwrap();
        let Prog::Seq(items) = main else { panic!("expected seq") };
        assert_eq!(items[0], Prog::Data(Value::unit()));
        // The import is missing: compilation fails.
        let src = "from prelude import missing\nprog main [ missing ]";
        assert!(compile(src.as_bytes(), &mut OneModule(compile_str("").unwrap())).is_err());
        // The module is missing: compilation fails.
        assert!(compile(b"open nowhere", &mut NoEffects).is_err());
    }

    #[test]
    fn test_open_binds_all_entries() {
        struct OneModule(Value);
        impl Effects for OneModule {
            fn txn_begin(&mut self) {}
            fn txn_commit(&mut self) {}
            fn txn_abort(&mut self) {}
            fn effect(&mut self, request: &Value) -> Option<Value> {
                request.as_variant().and_then(|(label, _)| {
                    (label == "load").then(|| self.0.clone())
                })
            }
        }
        let prelude = compile_str("prog nip [ swap drop ]\ndata one [ 1 ]").unwrap();
        let src = "open prelude\nprog main [ one nip ]";
        let module = compile(src.as_bytes(), &mut OneModule(prelude)).unwrap();
        assert!(record_lookup(&Bits::of_label("main"), &module).is_some());
        // Opened names are not re-exported.
        assert!(record_lookup(&Bits::of_label("nip"), &module).is_none());
    }
}
