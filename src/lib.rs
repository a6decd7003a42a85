/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

#![doc = include_str!("../README.md")]
#![deny(unstable_features)]
#![deny(trivial_casts)]
#![deny(unconditional_recursion)]
#![deny(clippy::empty_loop)]
#![deny(unreachable_code)]
#![deny(unreachable_pub)]
#![deny(unreachable_patterns)]
#![deny(unused_macro_rules)]
#![deny(unused_doc_comments)]

pub mod arith;
pub mod bits;
pub mod effects;
pub mod interp;
pub mod lang;
pub mod loader;
pub mod prog;
pub mod refs;
pub mod rope;
pub mod texttree;
pub mod value;

/// Prelude module to import everything from this crate
pub mod prelude {
    pub use crate::bits::Bits;
    pub use crate::effects::{Effects, NoEffects, OrElse, TxnLogger};
    pub use crate::interp::eval;
    pub use crate::loader::Loader;
    pub use crate::prog::{arity, Arity, Op, Prog};
    pub use crate::refs::ValueRef;
    pub use crate::rope::Rope;
    pub use crate::value::{
        of_key, record_delete, record_insert, record_lookup, to_key, Value,
    };
}
