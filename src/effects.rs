/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The transactional effect-handler protocol.
//!
//! The interpreter talks to the outside world through an [`Effects`]
//! handler. Conditional and loop transactions open a child transaction
//! around speculative work: on the success path the transaction is
//! committed and its effects merge into the parent scope, on the failure
//! path it is aborted and the handler must restore its externally
//! observable state to the snapshot taken at [`Effects::txn_begin`]. The
//! interpreter guarantees that every begin is matched by exactly one commit
//! or abort on all paths; handlers may assume balanced calls and should
//! panic on violations.

use crate::rope::Rope;
use crate::value::Value;
use log::{debug, info};

/// A transactional effect handler.
pub trait Effects {
    /// Begins a child transaction.
    fn txn_begin(&mut self);

    /// Concludes the innermost transaction, merging its effects into the
    /// parent scope (or making them externally visible at the outermost
    /// level).
    fn txn_commit(&mut self);

    /// Concludes and undoes the innermost transaction.
    fn txn_abort(&mut self);

    /// Attempts an effect; `None` means unrecognized or failing, which the
    /// interpreter turns into a program failure at the `eff` op.
    fn effect(&mut self, request: &Value) -> Option<Value>;
}

/// A handler that recognizes nothing. Transactions are accepted and have
/// nothing to undo.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEffects;

impl Effects for NoEffects {
    fn txn_begin(&mut self) {}
    fn txn_commit(&mut self) {}
    fn txn_abort(&mut self) {}
    fn effect(&mut self, _request: &Value) -> Option<Value> {
        None
    }
}

/// Composition of two handlers: requests go to `first`, then to `second`
/// if unrecognized. Transactions are opened first-to-second and concluded
/// second-to-first, so nested failures unwind in LIFO order.
pub struct OrElse<A, B> {
    first: A,
    second: B,
}

impl<A: Effects, B: Effects> OrElse<A, B> {
    pub fn new(first: A, second: B) -> Self {
        OrElse { first, second }
    }
}

impl<A: Effects, B: Effects> Effects for OrElse<A, B> {
    fn txn_begin(&mut self) {
        self.first.txn_begin();
        self.second.txn_begin();
    }

    fn txn_commit(&mut self) {
        self.second.txn_commit();
        self.first.txn_commit();
    }

    fn txn_abort(&mut self) {
        self.second.txn_abort();
        self.first.txn_abort();
    }

    fn effect(&mut self, request: &Value) -> Option<Value> {
        self.first
            .effect(request)
            .or_else(|| self.second.effect(request))
    }
}

/// Wraps an aborted message so downstream observers can tell it was
/// recanted; nested aborts nest the wrapper, recording the abort depth.
pub fn recant(message: Value) -> Value {
    Value::variant("recant", message)
}

/// The transactional logging handler.
///
/// `log:<message>` requests append to the rope of the innermost open
/// transaction. Commit merges a transaction's messages into its parent;
/// abort first applies the rewrite (by default [`recant`]) to each message,
/// so debugging information from abandoned branches survives. Messages
/// logged outside any transaction, or merged all the way out, reach the
/// sink in program order.
pub struct TxnLogger<S: FnMut(Value)> {
    /// One rope of pending messages per open transaction, innermost last.
    pending: Vec<Rope>,
    rewrite: fn(Value) -> Value,
    sink: S,
}

impl<S: FnMut(Value)> TxnLogger<S> {
    pub fn new(sink: S) -> Self {
        TxnLogger {
            pending: Vec::new(),
            rewrite: recant,
            sink,
        }
    }

    /// Replaces the abort rewrite applied to recanted messages.
    pub fn with_rewrite(mut self, rewrite: fn(Value) -> Value) -> Self {
        self.rewrite = rewrite;
        self
    }

    fn merge(&mut self, messages: Rope) {
        match self.pending.last_mut() {
            Some(parent) => *parent = parent.append(&messages),
            None => {
                for message in messages.iter() {
                    (self.sink)(message);
                }
            }
        }
    }
}

impl<S: FnMut(Value)> Effects for TxnLogger<S> {
    fn txn_begin(&mut self) {
        self.pending.push(Rope::empty());
    }

    fn txn_commit(&mut self) {
        let messages = self.pending.pop().expect("commit without transaction");
        self.merge(messages);
    }

    fn txn_abort(&mut self) {
        let messages = self.pending.pop().expect("abort without transaction");
        let recanted = messages.map(self.rewrite);
        self.merge(recanted);
    }

    fn effect(&mut self, request: &Value) -> Option<Value> {
        let (label, message) = request.as_variant()?;
        if label != "log" {
            return None;
        }
        match self.pending.last_mut() {
            Some(txn) => *txn = txn.snoc(message),
            None => (self.sink)(message),
        }
        Some(Value::unit())
    }
}

/// A logger whose sink writes through the `log` facade: committed messages
/// at info level, recanted ones at debug level.
pub fn log_facade_sink(message: Value) {
    if let Some((label, _)) = message.as_variant() {
        if label == "recant" {
            debug!("{}", message);
            return;
        }
    }
    info!("{}", message);
}
