//! The expression language used by constraint builders.
//!
//! Expressions are source strings compiled on first use; the compiled
//! program is immutable and shared between clones of an expression value.
//! Three flavors exist, differing only in their bindings and result type:
//!
//! - [`SelectorExpression`]: `Entity -> bool`, for filtering the universe
//! - [`SortExpression`]: `(EntityOne, EntityTwo) -> int`, for ordering
//! - [`GroupByExpression`]: `Entity -> [string]`, for bucketing
//!
//! All three share the builtin library: `InSemverRange(version, range)`,
//! `SemverCompare(a, b)`, `JSONPath(json, path)` and the higher-order
//! `any(seq, predicate)` with `#` bound to each element.

mod eval;
mod parser;
mod token;

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::ExprError;

use eval::{eval, Env, Value};
use parser::Program;

/// Compilation cache shared by the three expression flavors.
///
/// The first evaluation compiles and memoizes; both success and failure are
/// cached so a broken expression reports the same compile error every time.
#[derive(Default)]
struct Compiled(RefCell<Option<Result<Rc<Program>, ExprError>>>);

impl Compiled {
    fn get(&self, source: &str) -> Result<Rc<Program>, ExprError> {
        let mut slot = self.0.borrow_mut();
        if slot.is_none() {
            *slot = Some(parser::compile(source).map(Rc::new));
        }
        match slot.as_ref() {
            Some(Ok(program)) => Ok(Rc::clone(program)),
            Some(Err(err)) => Err(err.clone()),
            None => Err(ExprError::Compile("expression cache poisoned".to_string())),
        }
    }

    fn clone_cache(&self) -> Self {
        Compiled(RefCell::new(self.0.borrow().clone()))
    }
}

macro_rules! expression_type {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Serialize, Deserialize)]
        pub struct $name {
            expression: String,
            #[serde(skip)]
            program: Compiled,
        }

        impl $name {
            pub fn new(expression: impl Into<String>) -> Self {
                Self {
                    expression: expression.into(),
                    program: Compiled::default(),
                }
            }

            /// The source string of this expression.
            pub fn source(&self) -> &str {
                &self.expression
            }

            fn compiled(&self) -> Result<Rc<Program>, ExprError> {
                self.program.get(&self.expression)
            }
        }

        impl Clone for $name {
            fn clone(&self) -> Self {
                Self {
                    expression: self.expression.clone(),
                    program: self.program.clone_cache(),
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("expression", &self.expression)
                    .finish()
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.expression == other.expression
            }
        }
    };
}

expression_type!(
    SelectorExpression,
    "A boolean predicate over a single entity."
);
expression_type!(
    SortExpression,
    "A three-way comparator over a pair of entities: negative orders \
     `EntityOne` first, positive orders it last."
);
expression_type!(
    GroupByExpression,
    "Maps an entity to zero or more group keys."
);

impl SelectorExpression {
    pub fn evaluate(&self, entity: &Entity) -> Result<bool, ExprError> {
        let program = self.compiled()?;
        let env = Env {
            entity: Some(entity),
            ..Default::default()
        };
        eval(&program.root, &env)?.into_bool()
    }
}

impl SortExpression {
    pub fn evaluate(&self, one: &Entity, two: &Entity) -> Result<i64, ExprError> {
        let program = self.compiled()?;
        let env = Env {
            entity_one: Some(one),
            entity_two: Some(two),
            ..Default::default()
        };
        eval(&program.root, &env)?.into_int()
    }

    /// Stable-sort entities by this comparator.
    ///
    /// A comparator error cannot unwind out of the sort, so the first error
    /// is captured, the remaining comparisons degrade to `Equal`, and the
    /// error is returned afterwards.
    pub(crate) fn sort(&self, entities: &mut [&Entity]) -> Result<(), ExprError> {
        let mut first_err: Option<ExprError> = None;
        entities.sort_by(|a, b| match self.evaluate(a, b) {
            Ok(n) => n.cmp(&0),
            Err(err) => {
                first_err.get_or_insert(err);
                Ordering::Equal
            }
        });
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl GroupByExpression {
    pub fn evaluate(&self, entity: &Entity) -> Result<Vec<String>, ExprError> {
        let program = self.compiled()?;
        let env = Env {
            entity: Some(entity),
            ..Default::default()
        };
        match eval(&program.root, &env)? {
            Value::Seq(keys) => Ok(keys),
            Value::Str(key) => Ok(vec![key]),
            other => other.into_seq(),
        }
    }
}
