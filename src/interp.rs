/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The program interpreter.
//!
//! The evaluator is a trampolined loop over an explicit control stack of
//! [`Step`]s borrowed from the program tree, so deep `seq` chains and long
//! unwinding paths never recurse on the host stack. The runtime state is
//! three stacks: the data stack, the dip stack of values hidden by `dip`,
//! and the stack of handler frames installed by `env`.
//!
//! Program failure is a first-class recoverable condition: it unwinds the
//! control stack to the nearest `cond`/`loop` marker, aborting the
//! handler transaction opened there and restoring the snapshot taken when
//! the marker was pushed. Every transaction the interpreter opens is
//! concluded by exactly one commit or abort on all paths, which is the
//! contract the external handler relies on.

use crate::arith;
use crate::bits::Bits;
use crate::effects::Effects;
use crate::prog::{Op, Prog};
use crate::rope::Rope;
use crate::value::{record_delete, record_insert, record_lookup, Value};

/// Runs `prog` against `effects` with the given initial data stack (top of
/// stack last). Returns the final data stack, or `None` if the evaluation
/// failed at the top level.
pub fn eval(prog: &Prog, effects: &mut dyn Effects, stack: Vec<Value>) -> Option<Vec<Value>> {
    Machine {
        ds: stack,
        rs: Vec::new(),
        es: Vec::new(),
        ctrl: vec![Step::Run(prog)],
        effects,
    }
    .run()
}

/// A handler frame installed by `env`: the current handler state and the
/// program mediating `eff` requests.
#[derive(Clone)]
struct EnvFrame<'p> {
    state: Value,
    with_: &'p Prog,
}

/// The saved runtime state of a `cond`/`loop` transaction.
struct Snapshot<'p> {
    ds: Vec<Value>,
    rs: Vec<Value>,
    es: Vec<EnvFrame<'p>>,
}

enum Step<'p> {
    Run(&'p Prog),
    /// Move the hidden dip value back onto the data stack.
    DipRestore,
    /// The `try` branch succeeded: commit (the catch marker is directly
    /// below) and run `then`.
    CondThen(&'p Prog),
    /// Unwinding marker for an open `cond` transaction.
    CondCatch(Snapshot<'p>, &'p Prog),
    /// The `while` branch succeeded: commit and run `do`, then re-enter.
    LoopDo { while_: &'p Prog, do_: &'p Prog },
    /// Unwinding marker for an open `loop` transaction.
    LoopCatch(Snapshot<'p>),
    /// The `do` branch finished: start the next iteration.
    LoopNext { while_: &'p Prog, do_: &'p Prog },
    /// Pop the handler frame back onto the data stack after `env`.
    EnvPop,
    /// Reinstall the handler frame with the state left by its program.
    EffRestore(&'p Prog),
}

/// Recoverable program failure.
struct Fail;

struct Machine<'p, 'e> {
    ds: Vec<Value>,
    rs: Vec<Value>,
    es: Vec<EnvFrame<'p>>,
    ctrl: Vec<Step<'p>>,
    effects: &'e mut dyn Effects,
}

impl<'p> Machine<'p, '_> {
    fn run(mut self) -> Option<Vec<Value>> {
        while let Some(step) = self.ctrl.pop() {
            if self.step(step).is_err() && !self.unwind() {
                return None;
            }
        }
        Some(self.ds)
    }

    fn snapshot(&self) -> Snapshot<'p> {
        Snapshot {
            ds: self.ds.clone(),
            rs: self.rs.clone(),
            es: self.es.clone(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot<'p>) {
        self.ds = snapshot.ds;
        self.rs = snapshot.rs;
        self.es = snapshot.es;
    }

    /// Unwinds after a failure. Returns false when the failure reaches the
    /// top level.
    fn unwind(&mut self) -> bool {
        while let Some(step) = self.ctrl.pop() {
            match step {
                Step::CondCatch(snapshot, else_) => {
                    self.effects.txn_abort();
                    self.restore(snapshot);
                    self.ctrl.push(Step::Run(else_));
                    return true;
                }
                Step::LoopCatch(snapshot) => {
                    // A failing `while` terminates the loop successfully.
                    self.effects.txn_abort();
                    self.restore(snapshot);
                    return true;
                }
                // Everything else is discarded: the data these frames
                // would restore is part of the enclosing snapshot.
                _ => {}
            }
        }
        false
    }

    fn enter_loop(&mut self, while_: &'p Prog, do_: &'p Prog) {
        self.effects.txn_begin();
        let snapshot = self.snapshot();
        self.ctrl.push(Step::LoopCatch(snapshot));
        self.ctrl.push(Step::LoopDo { while_, do_ });
        self.ctrl.push(Step::Run(while_));
    }

    fn step(&mut self, step: Step<'p>) -> Result<(), Fail> {
        match step {
            Step::Run(prog) => self.run_prog(prog)?,
            Step::DipRestore => {
                let hidden = self.rs.pop().expect("dip stack underflow");
                self.ds.push(hidden);
            }
            Step::CondThen(then_) => {
                match self.ctrl.pop() {
                    Some(Step::CondCatch(_, _)) => {}
                    _ => unreachable!("cond commit without its marker"),
                }
                self.effects.txn_commit();
                self.ctrl.push(Step::Run(then_));
            }
            Step::LoopDo { while_, do_ } => {
                match self.ctrl.pop() {
                    Some(Step::LoopCatch(_)) => {}
                    _ => unreachable!("loop commit without its marker"),
                }
                self.effects.txn_commit();
                self.ctrl.push(Step::LoopNext { while_, do_ });
                self.ctrl.push(Step::Run(do_));
            }
            Step::LoopNext { while_, do_ } => self.enter_loop(while_, do_),
            Step::EnvPop => {
                let frame = self.es.pop().expect("env frame stack underflow");
                self.ds.push(frame.state);
            }
            Step::EffRestore(with_) => {
                let state = self.pop()?;
                self.es.push(EnvFrame { state, with_ });
            }
            Step::CondCatch(_, _) | Step::LoopCatch(_) => {
                unreachable!("catch marker reached without its commit")
            }
        }
        Ok(())
    }

    fn run_prog(&mut self, prog: &'p Prog) -> Result<(), Fail> {
        match prog {
            Prog::Op(op) => self.exec_op(*op)?,
            Prog::Data(value) => self.ds.push(value.clone()),
            Prog::Seq(ps) => {
                for p in ps.iter().rev() {
                    self.ctrl.push(Step::Run(p));
                }
            }
            Prog::Dip(p) => {
                let hidden = self.pop()?;
                self.rs.push(hidden);
                self.ctrl.push(Step::DipRestore);
                self.ctrl.push(Step::Run(p.as_ref()));
            }
            Prog::Cond { try_, then_, else_ } => {
                self.effects.txn_begin();
                let snapshot = self.snapshot();
                self.ctrl.push(Step::CondCatch(snapshot, else_.as_ref()));
                self.ctrl.push(Step::CondThen(then_.as_ref()));
                self.ctrl.push(Step::Run(try_.as_ref()));
            }
            Prog::Loop { while_, do_ } => self.enter_loop(while_.as_ref(), do_.as_ref()),
            Prog::Env { with_, do_ } => {
                let state = self.pop()?;
                self.es.push(EnvFrame {
                    state,
                    with_: with_.as_ref(),
                });
                self.ctrl.push(Step::EnvPop);
                self.ctrl.push(Step::Run(do_.as_ref()));
            }
            Prog::Prog { do_, .. } => self.ctrl.push(Step::Run(do_.as_ref())),
            Prog::Note(_) => {}
        }
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, Fail> {
        self.ds.pop().ok_or(Fail)
    }

    fn pop_bits(&mut self) -> Result<Bits, Fail> {
        self.pop()?.as_bits().cloned().ok_or(Fail)
    }

    fn pop_rope(&mut self) -> Result<Rope, Fail> {
        self.pop()?.to_rope().ok_or(Fail)
    }

    fn pop_index(&mut self) -> Result<usize, Fail> {
        let n = self.pop_bits()?.to_nat().ok_or(Fail)?;
        usize::try_from(n).map_err(|_| Fail)
    }

    fn exec_op(&mut self, op: Op) -> Result<(), Fail> {
        match op {
            Op::Copy => {
                let top = self.ds.last().ok_or(Fail)?.clone();
                self.ds.push(top);
            }
            Op::Drop => {
                self.pop()?;
            }
            Op::Swap => {
                let len = self.ds.len();
                if len < 2 {
                    return Err(Fail);
                }
                self.ds.swap(len - 1, len - 2);
            }
            Op::Eq => {
                let b = self.pop()?;
                let a = self.pop()?;
                if a != b {
                    return Err(Fail);
                }
            }
            Op::Fail => return Err(Fail),
            Op::Eff => {
                let request = self.pop()?;
                match self.es.pop() {
                    None => {
                        let response = self.effects.effect(&request).ok_or(Fail)?;
                        self.ds.push(response);
                    }
                    Some(frame) => {
                        // Run the handler program on (request, state) with
                        // the parent handler context in scope.
                        self.ds.push(request);
                        self.ds.push(frame.state);
                        self.ctrl.push(Step::EffRestore(frame.with_));
                        self.ctrl.push(Step::Run(frame.with_));
                    }
                }
            }
            Op::Get => {
                let record = self.pop()?;
                let key = self.pop_bits()?;
                let value = record_lookup(&key, &record).ok_or(Fail)?;
                self.ds.push(value);
            }
            Op::Put => {
                let record = self.pop()?;
                let value = self.pop()?;
                let key = self.pop_bits()?;
                self.ds.push(record_insert(&key, value, &record));
            }
            Op::Del => {
                let record = self.pop()?;
                let key = self.pop_bits()?;
                self.ds.push(record_delete(&key, &record));
            }
            Op::Pushl => {
                let list = self.pop_rope()?;
                let value = self.pop()?;
                self.ds.push(Value::of_rope(list.cons(value)));
            }
            Op::Pushr => {
                let list = self.pop_rope()?;
                let value = self.pop()?;
                self.ds.push(Value::of_rope(list.snoc(value)));
            }
            Op::Popl => {
                let list = self.pop_rope()?;
                let (value, rest) = list.pop_first().ok_or(Fail)?;
                self.ds.push(value);
                self.ds.push(Value::of_rope(rest));
            }
            Op::Popr => {
                let list = self.pop_rope()?;
                let (rest, value) = list.pop_last().ok_or(Fail)?;
                self.ds.push(value);
                self.ds.push(Value::of_rope(rest));
            }
            Op::Join => {
                let second = self.pop_rope()?;
                let first = self.pop_rope()?;
                self.ds.push(Value::of_rope(first.append(&second)));
            }
            Op::Split => {
                let list = self.pop_rope()?;
                let n = self.pop_index()?;
                if n > list.len() {
                    return Err(Fail);
                }
                let (prefix, suffix) = list.split(n);
                self.ds.push(Value::of_rope(prefix));
                self.ds.push(Value::of_rope(suffix));
            }
            Op::Len => {
                let list = self.pop_rope()?;
                self.ds.push(Value::of_nat(list.len() as u64));
            }
            Op::Bjoin => {
                let second = self.pop_bits()?;
                let first = self.pop_bits()?;
                self.ds.push(Value::of_bits(first.append(&second)));
            }
            Op::Bsplit => {
                let bits = self.pop_bits()?;
                let n = self.pop_index()?;
                if n > bits.len() {
                    return Err(Fail);
                }
                let (prefix, suffix) = bits.split_at(n);
                self.ds.push(Value::of_bits(prefix));
                self.ds.push(Value::of_bits(suffix));
            }
            Op::Blen => {
                let bits = self.pop_bits()?;
                self.ds.push(Value::of_nat(bits.len() as u64));
            }
            Op::Bneg => {
                let bits = self.pop_bits()?;
                self.ds.push(Value::of_bits(bits.not()));
            }
            Op::Bmax => {
                let b = self.pop_bits()?;
                let a = self.pop_bits()?;
                self.ds.push(Value::of_bits(a.or(&b).ok_or(Fail)?));
            }
            Op::Bmin => {
                let b = self.pop_bits()?;
                let a = self.pop_bits()?;
                self.ds.push(Value::of_bits(a.and(&b).ok_or(Fail)?));
            }
            Op::Beq => {
                let b = self.pop_bits()?;
                let a = self.pop_bits()?;
                self.ds.push(Value::of_bits(a.eqv(&b).ok_or(Fail)?));
            }
            Op::Add => {
                let n2 = self.pop_bits()?;
                let n1 = self.pop_bits()?;
                let (sum, carry) = arith::add(&n1, &n2);
                self.ds.push(Value::of_bits(sum));
                self.ds.push(Value::of_bits(carry));
            }
            Op::Mul => {
                let n2 = self.pop_bits()?;
                let n1 = self.pop_bits()?;
                let (prod, overflow) = arith::mul(&n1, &n2);
                self.ds.push(Value::of_bits(prod));
                self.ds.push(Value::of_bits(overflow));
            }
            Op::Sub => {
                let n2 = self.pop_bits()?;
                let n1 = self.pop_bits()?;
                let diff = arith::sub(&n1, &n2).ok_or(Fail)?;
                self.ds.push(Value::of_bits(diff));
            }
            Op::Div => {
                let divisor = self.pop_bits()?;
                let dividend = self.pop_bits()?;
                let (quotient, remainder) = arith::div(&dividend, &divisor).ok_or(Fail)?;
                self.ds.push(Value::of_bits(quotient));
                self.ds.push(Value::of_bits(remainder));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::effects::{NoEffects, TxnLogger};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn op(op: Op) -> Prog {
        Prog::Op(op)
    }

    fn data(v: Value) -> Prog {
        Prog::Data(v)
    }

    fn seq(ps: Vec<Prog>) -> Prog {
        Prog::Seq(ps)
    }

    fn run(prog: &Prog, stack: Vec<Value>) -> Option<Vec<Value>> {
        eval(prog, &mut NoEffects, stack)
    }

    #[test]
    fn test_add_preserves_widths() {
        // [0x0F, 0xF0] add => [0xFF, 0x00].
        let stack = vec![Value::of_byte(0x0F), Value::of_byte(0xF0)];
        let out = run(&op(Op::Add), stack).unwrap();
        assert_eq!(out, vec![Value::of_byte(0xFF), Value::of_byte(0x00)]);
    }

    #[test]
    fn test_list_split_then_join() {
        let list = Value::of_list((10..=50).step_by(10).map(Value::of_nat));
        let stack = vec![Value::of_nat(3), list.clone()];
        let out = run(&op(Op::Split), stack).unwrap();
        assert_eq!(
            out,
            vec![
                Value::of_list([10, 20, 30].map(Value::of_nat)),
                Value::of_list([40, 50].map(Value::of_nat)),
            ]
        );
        let rejoined = run(&op(Op::Join), out).unwrap();
        assert_eq!(rejoined, vec![list]);
    }

    #[test]
    fn test_record_put_get_del() {
        let key = Value::symbol("a");
        let put = seq(vec![op(Op::Put)]);
        let out = run(
            &put,
            vec![key.clone(), Value::of_nat(1), Value::unit()],
        )
        .unwrap();
        assert_eq!(out, vec![Value::variant("a", Value::of_nat(1))]);
        let rec = out[0].clone();
        let got = run(&op(Op::Get), vec![key.clone(), rec.clone()]).unwrap();
        assert_eq!(got, vec![Value::of_nat(1)]);
        let deleted = run(&op(Op::Del), vec![key.clone(), rec]).unwrap();
        assert_eq!(deleted, vec![Value::unit()]);
        // get on a missing key is a failure.
        assert!(run(&op(Op::Get), vec![key, Value::unit()]).is_none());
    }

    #[test]
    fn test_cond_backtracks_stack() {
        // try pushes garbage and fails; else sees the original stack.
        let prog = Prog::Cond {
            try_: Box::new(seq(vec![
                data(Value::of_nat(99)),
                data(Value::of_nat(99)),
                op(Op::Fail),
            ])),
            then_: Box::new(Prog::nop()),
            else_: Box::new(data(Value::symbol("fallback"))),
        };
        let out = run(&prog, vec![Value::of_nat(1)]).unwrap();
        assert_eq!(out, vec![Value::of_nat(1), Value::symbol("fallback")]);
    }

    #[test]
    fn test_dip_hides_and_restores() {
        // [a, b] dip:(drop) removes a, keeps b.
        let prog = Prog::Dip(Box::new(op(Op::Drop)));
        let out = run(
            &prog,
            vec![Value::of_nat(1), Value::of_nat(2)],
        )
        .unwrap();
        assert_eq!(out, vec![Value::of_nat(2)]);
        // A failing dip body restores the hidden value before propagating.
        let prog = Prog::Cond {
            try_: Box::new(Prog::Dip(Box::new(op(Op::Fail)))),
            then_: Box::new(Prog::nop()),
            else_: Box::new(Prog::nop()),
        };
        let out = run(&prog, vec![Value::of_nat(5)]).unwrap();
        assert_eq!(out, vec![Value::of_nat(5)]);
    }

    #[test]
    fn test_loop_drains_list() {
        // while: popl then drop the element under the list; terminates
        // when the list runs out, leaving the empty list.
        let prog = Prog::Loop {
            while_: Box::new(seq(vec![op(Op::Popl), Prog::Dip(Box::new(op(Op::Drop)))])),
            do_: Box::new(Prog::nop()),
        };
        let zeros = Value::of_list([Value::of_nat(0), Value::of_nat(0), Value::of_nat(0)]);
        let out = run(&prog, vec![zeros]).unwrap();
        assert_eq!(out, vec![Value::of_list([])]);
    }

    #[test]
    fn test_loop_do_failure_is_fatal() {
        // A failure in do is not caught by the loop.
        let prog = Prog::Loop {
            while_: Box::new(Prog::nop()),
            do_: Box::new(op(Op::Fail)),
        };
        assert!(run(&prog, vec![]).is_none());
    }

    #[test]
    fn test_eff_without_handler_fails() {
        assert!(run(&op(Op::Eff), vec![Value::symbol("quit")]).is_none());
    }

    #[test]
    fn test_env_mediates_eff() {
        // Handler: (request, state) -> (state-as-response, request-as-state):
        // a swap makes the old state the response and stores the request.
        let prog = Prog::Env {
            with_: Box::new(op(Op::Swap)),
            do_: Box::new(op(Op::Eff)),
        };
        // Stack: [request-under-env... ]: env pops initial state, eff uses it.
        let out = run(
            &prog,
            vec![Value::symbol("request"), Value::symbol("state0")],
        )
        .unwrap();
        // Response is state0; final state (request) is pushed back by env.
        assert_eq!(
            out,
            vec![Value::symbol("state0"), Value::symbol("request")]
        );
    }

    #[test]
    fn test_recanted_log_messages() {
        // cond:(try: [data log:"tried", eff, fail]) records "tried" as
        // recanted and succeeds at the top level.
        let out = Rc::new(RefCell::new(Vec::new()));
        let sink = out.clone();
        let mut logger = TxnLogger::new(move |v| sink.borrow_mut().push(v));
        let prog = Prog::Cond {
            try_: Box::new(seq(vec![
                data(Value::variant("log", Value::of_text("tried"))),
                op(Op::Eff),
                op(Op::Fail),
            ])),
            then_: Box::new(Prog::nop()),
            else_: Box::new(Prog::nop()),
        };
        let result = eval(&prog, &mut logger, vec![]);
        assert_eq!(result, Some(vec![]));
        assert_eq!(
            out.borrow().as_slice(),
            &[Value::variant("recant", Value::of_text("tried"))]
        );
    }

    #[test]
    fn test_committed_logs_stay_plain() {
        let out = Rc::new(RefCell::new(Vec::new()));
        let sink = out.clone();
        let mut logger = TxnLogger::new(move |v| sink.borrow_mut().push(v));
        let prog = Prog::Cond {
            try_: Box::new(seq(vec![
                data(Value::variant("log", Value::of_text("kept"))),
                op(Op::Eff),
                op(Op::Drop),
            ])),
            then_: Box::new(Prog::nop()),
            else_: Box::new(Prog::nop()),
        };
        assert!(eval(&prog, &mut logger, vec![]).is_some());
        assert_eq!(out.borrow().as_slice(), &[Value::of_text("kept")]);
    }

    #[test]
    fn test_deep_seq_iterates() {
        // A very wide seq runs without recursing per element.
        let wide = seq((0..50_000)
            .map(|_| seq(vec![data(Value::of_nat(1)), op(Op::Drop)]))
            .collect());
        let out = run(&wide, vec![]).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_bitstring_ops() {
        let a = Value::of_byte(0b1100_0000);
        let b = Value::of_byte(0b1010_0000);
        let out = run(&op(Op::Bmin), vec![a.clone(), b.clone()]).unwrap();
        assert_eq!(out, vec![Value::of_byte(0b1000_0000)]);
        let out = run(&op(Op::Bmax), vec![a.clone(), b.clone()]).unwrap();
        assert_eq!(out, vec![Value::of_byte(0b1110_0000)]);
        let out = run(&op(Op::Beq), vec![a.clone(), b.clone()]).unwrap();
        assert_eq!(out, vec![Value::of_byte(0b1001_1111)]);
        // bsplit 3 on a byte.
        let out = run(
            &op(Op::Bsplit),
            vec![Value::of_nat(3), Value::of_byte(0b1011_0001)],
        )
        .unwrap();
        assert_eq!(out.len(), 2);
        let prefix = out[0].as_bits().unwrap().clone();
        let suffix = out[1].as_bits().unwrap().clone();
        assert_eq!(prefix.len(), 3);
        assert_eq!(suffix.len(), 5);
        assert_eq!(prefix.append(&suffix).to_byte(), Some(0b1011_0001));
        // Length mismatch in bitwise ops fails.
        assert!(run(&op(Op::Bmin), vec![a, Value::of_nat(1)]).is_none());
    }
}
