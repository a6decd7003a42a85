/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The program AST.
//!
//! A program is itself a value: operator symbols, `dip:P`, `data:V`,
//! `seq:[…]`, `cond:(try:…, then:…, else:…)`, `loop:(while:…, do:…)`,
//! `env:(with:…, do:…)`, `prog:(do:…, …annotations)` and `note:V`.
//! [`Prog::of_value`] validates a value into the AST and [`Prog::to_value`]
//! prints it back; parsing the print of a program yields an equal program.

mod arity;

pub use arity::{arity, Arity};

use crate::bits::Bits;
use crate::value::{record_delete, record_insert, record_lookup, Value};
use anyhow::{bail, Context, Result};

/// The primitive stack operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Copy,
    Drop,
    Swap,
    Eq,
    Fail,
    Eff,
    Get,
    Put,
    Del,
    Pushl,
    Popl,
    Pushr,
    Popr,
    Join,
    Split,
    Len,
    Bjoin,
    Bsplit,
    Blen,
    Bneg,
    Bmax,
    Bmin,
    Beq,
    Add,
    Mul,
    Sub,
    Div,
}

/// All operators with their reserved labels, in declaration order.
pub const OPS: &[(Op, &str)] = &[
    (Op::Copy, "copy"),
    (Op::Drop, "drop"),
    (Op::Swap, "swap"),
    (Op::Eq, "eq"),
    (Op::Fail, "fail"),
    (Op::Eff, "eff"),
    (Op::Get, "get"),
    (Op::Put, "put"),
    (Op::Del, "del"),
    (Op::Pushl, "pushl"),
    (Op::Popl, "popl"),
    (Op::Pushr, "pushr"),
    (Op::Popr, "popr"),
    (Op::Join, "join"),
    (Op::Split, "split"),
    (Op::Len, "len"),
    (Op::Bjoin, "bjoin"),
    (Op::Bsplit, "bsplit"),
    (Op::Blen, "blen"),
    (Op::Bneg, "bneg"),
    (Op::Bmax, "bmax"),
    (Op::Bmin, "bmin"),
    (Op::Beq, "beq"),
    (Op::Add, "add"),
    (Op::Mul, "mul"),
    (Op::Sub, "sub"),
    (Op::Div, "div"),
];

impl Op {
    /// The reserved label of the operator.
    pub fn label(self) -> &'static str {
        OPS.iter().find(|(op, _)| *op == self).unwrap().1
    }

    /// Looks an operator up by its reserved label.
    pub fn of_label(label: &str) -> Option<Op> {
        OPS.iter().find(|(_, l)| *l == label).map(|(op, _)| *op)
    }
}

/// A validated program.
#[derive(Debug, Clone, PartialEq)]
pub enum Prog {
    Op(Op),
    /// Runs the body with the top of the data stack hidden.
    Dip(Box<Prog>),
    /// Pushes a constant.
    Data(Value),
    Seq(Vec<Prog>),
    /// Transactional choice: if `try_` succeeds commit and run `then_`,
    /// otherwise abort, restore, and run `else_`.
    Cond {
        try_: Box<Prog>,
        then_: Box<Prog>,
        else_: Box<Prog>,
    },
    /// Transactional iteration: repeat `do_` while `while_` succeeds.
    Loop {
        while_: Box<Prog>,
        do_: Box<Prog>,
    },
    /// Installs a handler program over `do_`.
    Env {
        with_: Box<Prog>,
        do_: Box<Prog>,
    },
    /// An annotated program; annotations are carried verbatim.
    Prog {
        do_: Box<Prog>,
        anno: Value,
    },
    /// An executable no-op carrying an arbitrary note.
    Note(Value),
}

impl Prog {
    /// The canonical no-op, `seq:[]`.
    pub fn nop() -> Prog {
        Prog::Seq(Vec::new())
    }

    /// Validates a value as a program.
    ///
    /// Dispatch is on the leading label: the composite constructors first
    /// (note that `seq:[]` with an empty payload is structurally the bare
    /// symbol `seq`), then the operator table for labels over unit.
    pub fn of_value(value: &Value) -> Result<Prog> {
        let Some((label, inner)) = value.as_variant() else {
            bail!("not a program: {}", value);
        };
        match label.as_str() {
            "dip" => Ok(Prog::Dip(Box::new(
                Prog::of_value(&inner).context("in dip body")?,
            ))),
            "data" => Ok(Prog::Data(inner)),
            "seq" => {
                let Some(items) = inner.to_rope() else {
                    bail!("seq body is not a list: {}", inner);
                };
                let progs = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        Prog::of_value(&item).with_context(|| format!("in seq item {}", i))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Prog::Seq(progs))
            }
            "cond" => {
                let try_ = required_field(&inner, "try").context("in cond")?;
                let then_ = optional_field(&inner, "then").context("in cond")?;
                let else_ = optional_field(&inner, "else").context("in cond")?;
                Ok(Prog::Cond {
                    try_: Box::new(try_),
                    then_: Box::new(then_),
                    else_: Box::new(else_),
                })
            }
            "loop" => {
                let while_ = required_field(&inner, "while").context("in loop")?;
                let do_ = optional_field(&inner, "do").context("in loop")?;
                Ok(Prog::Loop {
                    while_: Box::new(while_),
                    do_: Box::new(do_),
                })
            }
            "env" => {
                let with_ = required_field(&inner, "with").context("in env")?;
                let do_ = required_field(&inner, "do").context("in env")?;
                Ok(Prog::Env {
                    with_: Box::new(with_),
                    do_: Box::new(do_),
                })
            }
            "prog" => {
                let do_ = optional_field(&inner, "do").context("in prog")?;
                let anno = record_delete(&Bits::of_label("do"), &inner);
                Ok(Prog::Prog {
                    do_: Box::new(do_),
                    anno,
                })
            }
            "note" => Ok(Prog::Note(inner)),
            other => {
                let Some(op) = Op::of_label(other) else {
                    bail!("unrecognized operator: {}", other);
                };
                if !inner.is_unit() {
                    bail!("operator {} does not take a payload", other);
                }
                Ok(Prog::Op(op))
            }
        }
    }

    /// Prints the program back as a value. Defaulted `cond`/`loop` branches
    /// print explicitly as no-ops, which parse back to an equal program.
    pub fn to_value(&self) -> Value {
        match self {
            Prog::Op(op) => Value::symbol(op.label()),
            Prog::Dip(p) => Value::variant("dip", p.to_value()),
            Prog::Data(v) => Value::variant("data", v.clone()),
            Prog::Seq(ps) => {
                Value::variant("seq", Value::of_list(ps.iter().map(Prog::to_value)))
            }
            Prog::Cond { try_, then_, else_ } => {
                let mut rec = Value::unit();
                rec = record_insert(&Bits::of_label("try"), try_.to_value(), &rec);
                rec = record_insert(&Bits::of_label("then"), then_.to_value(), &rec);
                rec = record_insert(&Bits::of_label("else"), else_.to_value(), &rec);
                Value::variant("cond", rec)
            }
            Prog::Loop { while_, do_ } => {
                let mut rec = Value::unit();
                rec = record_insert(&Bits::of_label("while"), while_.to_value(), &rec);
                rec = record_insert(&Bits::of_label("do"), do_.to_value(), &rec);
                Value::variant("loop", rec)
            }
            Prog::Env { with_, do_ } => {
                let mut rec = Value::unit();
                rec = record_insert(&Bits::of_label("with"), with_.to_value(), &rec);
                rec = record_insert(&Bits::of_label("do"), do_.to_value(), &rec);
                Value::variant("env", rec)
            }
            Prog::Prog { do_, anno } => {
                let rec = record_insert(&Bits::of_label("do"), do_.to_value(), anno);
                Value::variant("prog", rec)
            }
            Prog::Note(v) => Value::variant("note", v.clone()),
        }
    }
}

fn required_field(record: &Value, field: &str) -> Result<Prog> {
    let Some(value) = record_lookup(&Bits::of_label(field), record) else {
        bail!("missing {} field in {}", field, record);
    };
    Prog::of_value(&value).with_context(|| format!("in {} field", field))
}

fn optional_field(record: &Value, field: &str) -> Result<Prog> {
    match record_lookup(&Bits::of_label(field), record) {
        None => Ok(Prog::nop()),
        Some(value) => {
            Prog::of_value(&value).with_context(|| format!("in {} field", field))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ops_roundtrip() {
        for (op, label) in OPS {
            assert_eq!(Op::of_label(label), Some(*op));
            assert_eq!(op.label(), *label);
            let value = Value::symbol(label);
            assert_eq!(Prog::of_value(&value).unwrap(), Prog::Op(*op));
        }
        assert!(Prog::of_value(&Value::symbol("bogus")).is_err());
    }

    #[test]
    fn test_parse_print_roundtrip() {
        let prog = Prog::Seq(vec![
            Prog::Data(Value::of_nat(1)),
            Prog::Dip(Box::new(Prog::Op(Op::Copy))),
            Prog::Cond {
                try_: Box::new(Prog::Op(Op::Eq)),
                then_: Box::new(Prog::nop()),
                else_: Box::new(Prog::Op(Op::Fail)),
            },
            Prog::Loop {
                while_: Box::new(Prog::Op(Op::Popl)),
                do_: Box::new(Prog::Op(Op::Drop)),
            },
            Prog::Env {
                with_: Box::new(Prog::Op(Op::Fail)),
                do_: Box::new(Prog::nop()),
            },
            Prog::Note(Value::of_text("remark")),
        ]);
        let printed = prog.to_value();
        let parsed = Prog::of_value(&printed).unwrap();
        assert_eq!(parsed, prog);
    }

    #[test]
    fn test_cond_defaults() {
        // cond with only a try field parses with no-op branches.
        let rec = record_insert(
            &Bits::of_label("try"),
            Value::symbol("eq"),
            &Value::unit(),
        );
        let prog = Prog::of_value(&Value::variant("cond", rec)).unwrap();
        match prog {
            Prog::Cond { then_, else_, .. } => {
                assert_eq!(*then_, Prog::nop());
                assert_eq!(*else_, Prog::nop());
            }
            other => panic!("expected cond, got {:?}", other),
        }
    }

    #[test]
    fn test_prog_annotations_carried() {
        let mut rec = Value::unit();
        rec = record_insert(&Bits::of_label("do"), Value::symbol("copy"), &rec);
        rec = record_insert(&Bits::of_label("docs"), Value::of_text("dup"), &rec);
        let prog = Prog::of_value(&Value::variant("prog", rec.clone())).unwrap();
        match &prog {
            Prog::Prog { do_, anno } => {
                assert_eq!(**do_, Prog::Op(Op::Copy));
                assert_eq!(
                    record_lookup(&Bits::of_label("docs"), anno),
                    Some(Value::of_text("dup"))
                );
                assert_eq!(record_lookup(&Bits::of_label("do"), anno), None);
            }
            other => panic!("expected prog, got {:?}", other),
        }
        // The annotation survives printing.
        assert_eq!(Prog::of_value(&prog.to_value()).unwrap(), prog);
    }

    #[test]
    fn test_invalid_programs() {
        assert!(Prog::of_value(&Value::of_nat(3)).is_err());
        assert!(Prog::of_value(&Value::variant("cond", Value::unit())).is_err());
        assert!(Prog::of_value(&Value::variant("seq", Value::of_nat(1))).is_err());
        let bad_item = Value::variant("seq", Value::of_list([Value::of_nat(1)]));
        assert!(Prog::of_value(&bad_item).is_err());
    }
}
