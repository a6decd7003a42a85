/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Static stack arity analysis.
//!
//! Every operator has a fixed stack effect; composites combine them. The
//! analysis either proves a static arity, proves the program always fails,
//! or gives up with [`Arity::Dynamic`]. Shape violations (conditional
//! branches with different net effects, non-invariant loops, handlers that
//! are not 1--1 or 2--2) are reported as errors: they are load-time
//! validation failures, not runnable programs.

use super::{Op, Prog};
use crate::bits::Bits;
use crate::value::{record_lookup, Value};
use anyhow::{bail, Result};

/// The static stack effect of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Consumes `i` items and leaves `o`.
    Static(usize, usize),
    /// Always fails, after observing `i` items.
    Fail(usize),
    /// Not statically known.
    Dynamic,
}

impl std::fmt::Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arity::Static(i, o) => write!(f, "{}--{}", i, o),
            Arity::Fail(i) => write!(f, "{}--FAIL", i),
            Arity::Dynamic => write!(f, "dynamic"),
        }
    }
}

impl Op {
    /// The stack effect of the operator.
    pub fn arity(self) -> Arity {
        use Arity::*;
        match self {
            Op::Copy => Static(1, 2),
            Op::Drop => Static(1, 0),
            Op::Swap => Static(2, 2),
            Op::Eq => Static(2, 0),
            Op::Fail => Fail(0),
            Op::Eff => Static(1, 1),
            Op::Get => Static(2, 1),
            Op::Put => Static(3, 1),
            Op::Del => Static(2, 1),
            Op::Pushl | Op::Pushr => Static(2, 1),
            Op::Popl | Op::Popr => Static(1, 2),
            Op::Join => Static(2, 1),
            Op::Split => Static(2, 2),
            Op::Len => Static(1, 1),
            Op::Bjoin => Static(2, 1),
            Op::Bsplit => Static(2, 2),
            Op::Blen => Static(1, 1),
            Op::Bneg => Static(1, 1),
            Op::Bmax | Op::Bmin | Op::Beq => Static(2, 1),
            Op::Add | Op::Mul => Static(2, 2),
            Op::Sub => Static(2, 1),
            Op::Div => Static(2, 2),
        }
    }
}

/// Sequential composition of stack effects.
fn compose(a: Arity, b: Arity) -> Arity {
    match (a, b) {
        (Arity::Fail(i), _) => Arity::Fail(i),
        (Arity::Dynamic, _) | (_, Arity::Dynamic) => Arity::Dynamic,
        (Arity::Static(i1, o1), Arity::Fail(i2)) => Arity::Fail(i1 + i2.saturating_sub(o1)),
        (Arity::Static(i1, o1), Arity::Static(i2, o2)) => {
            let deficit = i2.saturating_sub(o1);
            Arity::Static(i1 + deficit, o2 + o1.saturating_sub(i2))
        }
    }
}

/// Widens a static arity to require at least `floor` inputs.
fn widen(a: Arity, floor: usize) -> Arity {
    match a {
        Arity::Static(i, o) if i < floor => Arity::Static(floor, floor - i + o),
        Arity::Fail(i) => Arity::Fail(i.max(floor)),
        other => other,
    }
}

/// Infers the static arity of a program.
pub fn arity(prog: &Prog) -> Result<Arity> {
    Ok(match prog {
        Prog::Op(op) => op.arity(),
        Prog::Data(_) => Arity::Static(0, 1),
        Prog::Note(_) => Arity::Static(0, 0),
        Prog::Dip(p) => match arity(p)? {
            Arity::Static(i, o) => Arity::Static(i + 1, o + 1),
            Arity::Fail(i) => Arity::Fail(i + 1),
            Arity::Dynamic => Arity::Dynamic,
        },
        Prog::Seq(ps) => {
            let mut acc = Arity::Static(0, 0);
            for p in ps {
                acc = compose(acc, arity(p)?);
            }
            acc
        }
        Prog::Cond { try_, then_, else_ } => {
            let pass = compose(arity(try_)?, arity(then_)?);
            let fall = arity(else_)?;
            match (pass, fall) {
                (Arity::Dynamic, _) | (_, Arity::Dynamic) => Arity::Dynamic,
                // A branch that cannot succeed adopts the other branch's
                // effect; its observed items only widen the input.
                (Arity::Fail(i1), Arity::Fail(i2)) => Arity::Fail(i1.max(i2)),
                (Arity::Fail(i1), fall) => widen(fall, i1),
                (pass, Arity::Fail(i2)) => widen(pass, i2),
                (Arity::Static(i1, o1), Arity::Static(i2, o2)) => {
                    if o1 + i2 != o2 + i1 {
                        bail!(
                            "cond branches disagree on stack effect: {}--{} vs {}--{}",
                            i1,
                            o1,
                            i2,
                            o2
                        );
                    }
                    let i = i1.max(i2);
                    Arity::Static(i, i - i1 + o1)
                }
            }
        }
        Prog::Loop { while_, do_ } => {
            let body = compose(arity(while_)?, arity(do_)?);
            match body {
                Arity::Static(i, o) if i == o => Arity::Static(i, i),
                Arity::Static(i, o) => {
                    bail!("loop body is not stack-invariant: {}--{}", i, o)
                }
                // A while that always fails makes the loop a no-op beyond
                // the items it observes.
                Arity::Fail(i) => Arity::Static(i, i),
                Arity::Dynamic => Arity::Dynamic,
            }
        }
        Prog::Env { with_, do_ } => {
            match arity(with_)? {
                Arity::Static(1, 1) | Arity::Static(2, 2) => {}
                other => bail!("env handler must be 1--1 or 2--2, inferred {}", other),
            }
            // The handler state hides the top of the data stack for the
            // duration of the body, as dip does.
            match arity(do_)? {
                Arity::Static(i, o) => Arity::Static(i + 1, o + 1),
                Arity::Fail(i) => Arity::Fail(i + 1),
                Arity::Dynamic => Arity::Dynamic,
            }
        }
        Prog::Prog { do_, anno } => {
            let inferred = arity(do_)?;
            match annotated_arity(anno) {
                None => inferred,
                Some((ai, ao)) => match inferred {
                    Arity::Static(i, o) if ai >= i && ao + i == o + ai => {
                        Arity::Static(ai, ao)
                    }
                    // An annotation the analysis cannot confirm makes the
                    // arity dynamic rather than wrong.
                    _ => Arity::Dynamic,
                },
            }
        }
    })
}

/// Reads an `arity:(i:Nat, o:Nat)` annotation, if present and well formed.
fn annotated_arity(anno: &Value) -> Option<(usize, usize)> {
    let claim = record_lookup(&Bits::of_label("arity"), anno)?;
    let i = record_lookup(&Bits::of_label("i"), &claim)?.to_nat()?;
    let o = record_lookup(&Bits::of_label("o"), &claim)?.to_nat()?;
    Some((i as usize, o as usize))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::record_insert;

    fn seq(ps: Vec<Prog>) -> Prog {
        Prog::Seq(ps)
    }

    #[test]
    fn test_seq_composition() {
        // copy then drop: 1--1.
        let p = seq(vec![Prog::Op(Op::Copy), Prog::Op(Op::Drop)]);
        assert_eq!(arity(&p).unwrap(), Arity::Static(1, 1));
        // data then add: needs one operand from below.
        let p = seq(vec![Prog::Data(Value::of_nat(1)), Prog::Op(Op::Add)]);
        assert_eq!(arity(&p).unwrap(), Arity::Static(1, 2));
        // fail dominates whatever follows.
        let p = seq(vec![Prog::Op(Op::Drop), Prog::Op(Op::Fail), Prog::Op(Op::Copy)]);
        assert_eq!(arity(&p).unwrap(), Arity::Fail(1));
    }

    #[test]
    fn test_dip_shifts() {
        let p = Prog::Dip(Box::new(Prog::Op(Op::Drop)));
        assert_eq!(arity(&p).unwrap(), Arity::Static(2, 1));
    }

    #[test]
    fn test_cond_agreement() {
        // Both branches 2--0: eq in try, two drops in else.
        let p = Prog::Cond {
            try_: Box::new(Prog::Op(Op::Eq)),
            then_: Box::new(Prog::nop()),
            else_: Box::new(seq(vec![Prog::Op(Op::Drop), Prog::Op(Op::Drop)])),
        };
        assert_eq!(arity(&p).unwrap(), Arity::Static(2, 0));
        // Disagreeing branches are a validation failure.
        let p = Prog::Cond {
            try_: Box::new(Prog::Op(Op::Eq)),
            then_: Box::new(Prog::nop()),
            else_: Box::new(Prog::Op(Op::Drop)),
        };
        assert!(arity(&p).is_err());
    }

    #[test]
    fn test_loop_invariance() {
        let p = Prog::Loop {
            while_: Box::new(seq(vec![Prog::Op(Op::Copy), Prog::Data(Value::of_nat(0)), Prog::Op(Op::Eq)])),
            do_: Box::new(Prog::nop()),
        };
        assert_eq!(arity(&p).unwrap(), Arity::Static(1, 1));
        let p = Prog::Loop {
            while_: Box::new(Prog::Op(Op::Popl)),
            do_: Box::new(Prog::nop()),
        };
        assert!(arity(&p).is_err());
    }

    #[test]
    fn test_env_handler_shape() {
        let handler_ok = Prog::Env {
            with_: Box::new(seq(vec![Prog::Op(Op::Copy), Prog::Op(Op::Drop)])),
            do_: Box::new(Prog::Op(Op::Eff)),
        };
        assert_eq!(arity(&handler_ok).unwrap(), Arity::Static(2, 2));
        let handler_bad = Prog::Env {
            with_: Box::new(Prog::Op(Op::Drop)),
            do_: Box::new(Prog::nop()),
        };
        assert!(arity(&handler_bad).is_err());
    }

    #[test]
    fn test_annotated_arity() {
        let mut claim = Value::unit();
        claim = record_insert(&Bits::of_label("i"), Value::of_nat(3), &claim);
        claim = record_insert(&Bits::of_label("o"), Value::of_nat(3), &claim);
        let anno = record_insert(&Bits::of_label("arity"), claim, &Value::unit());
        // copy;drop is 1--1; the annotation widens it to 3--3.
        let p = Prog::Prog {
            do_: Box::new(seq(vec![Prog::Op(Op::Copy), Prog::Op(Op::Drop)])),
            anno: anno.clone(),
        };
        assert_eq!(arity(&p).unwrap(), Arity::Static(3, 3));
        // An annotation narrower than the inferred input is dynamic.
        let p = Prog::Prog {
            do_: Box::new(Prog::Op(Op::Put)),
            anno,
        };
        assert_eq!(arity(&p).unwrap(), Arity::Dynamic);
    }

    #[test]
    fn test_display() {
        assert_eq!(Arity::Static(1, 2).to_string(), "1--2");
        assert_eq!(Arity::Fail(0).to_string(), "0--FAIL");
        assert_eq!(Arity::Dynamic.to_string(), "dynamic");
    }
}
