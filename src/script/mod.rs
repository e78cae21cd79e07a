//! Expression Scripts
//!
//! A small arithmetic language for value scripts, registered under the
//! language name `expr`:
//!
//! ```text
//! doc['price'] * params.rate
//! (doc['bytes'] / 1024) - params.overhead
//! ```
//!
//! Scripts go through three stages:
//!
//! - **compile**: parse, substitute `params.*`, resolve field mappings
//! - **for_segment**: load numeric field data for each referenced field
//! - **evaluate**: walk the tree for one document id
//!
//! `doc['f']` reads the first value of `f` for the document; a document
//! without a value is an evaluation error.

mod ast;
mod parser;

pub use ast::{BinaryOp, Expr};
pub use parser::parse_expression;

use crate::index::{
    DocId, FieldDataError, FieldLookup, FieldMapping, NumericValues, ScriptError, ScriptParams,
    ScriptService, SegmentContext, SegmentScript, ValueScript,
};
use std::sync::Arc;

/// Language name accepted by [`ExprScriptService`]
pub const EXPR_LANG: &str = "expr";

/// Compiled form of an expression: params folded in, fields as slots
#[derive(Debug, Clone, PartialEq)]
enum Node {
    Const(f64),
    Slot(usize),
    Neg(Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
}

fn lower(expr: &Expr, params: &ScriptParams, fields: &[FieldMapping]) -> Result<Node, ScriptError> {
    Ok(match expr {
        Expr::Number(v) => Node::Const(*v),
        Expr::Param(name) => Node::Const(resolve_param(name, params)?),
        Expr::Field(name) => fields
            .iter()
            .position(|m| m.name == *name)
            .map(Node::Slot)
            .ok_or_else(|| ScriptError::UnknownField(name.clone()))?,
        Expr::Neg(inner) => match lower(inner, params, fields)? {
            Node::Const(v) => Node::Const(-v),
            node => Node::Neg(Box::new(node)),
        },
        Expr::Binary { op, lhs, rhs } => {
            match (lower(lhs, params, fields)?, lower(rhs, params, fields)?) {
                (Node::Const(l), Node::Const(r)) => Node::Const(op.apply(l, r)),
                (l, r) => Node::Binary(*op, Box::new(l), Box::new(r)),
            }
        }
    })
}

fn resolve_param(name: &str, params: &ScriptParams) -> Result<f64, ScriptError> {
    let value = params.get(name).ok_or_else(|| ScriptError::Param {
        name: name.to_string(),
        reason: "not provided".to_string(),
    })?;

    value.as_f64().ok_or_else(|| ScriptError::Param {
        name: name.to_string(),
        reason: format!("expected a number, got {}", value),
    })
}

/// Script service for the `expr` language
pub struct ExprScriptService {
    fields: Arc<dyn FieldLookup>,
}

impl ExprScriptService {
    pub fn new(fields: Arc<dyn FieldLookup>) -> Self {
        Self { fields }
    }
}

impl ScriptService for ExprScriptService {
    fn compile(
        &self,
        lang: &str,
        source: &str,
        params: &ScriptParams,
    ) -> Result<Box<dyn ValueScript>, ScriptError> {
        if !lang.eq_ignore_ascii_case(EXPR_LANG) {
            return Err(ScriptError::UnsupportedLanguage(lang.to_string()));
        }

        let expr = parse_expression(source)?;

        let mut fields = Vec::new();
        for name in expr.fields() {
            let mapping = self
                .fields
                .resolve_field(name)
                .ok_or_else(|| ScriptError::UnknownField(name.to_string()))?;
            if !mapping.data_type.is_numeric() {
                return Err(FieldDataError::NotNumeric {
                    field: mapping.name,
                    data_type: mapping.data_type,
                }
                .into());
            }
            fields.push(mapping);
        }

        let root = lower(&expr, params, &fields)?;

        Ok(Box::new(ExprScript {
            root: Arc::new(root),
            fields: Arc::new(fields),
            lookup: Arc::clone(&self.fields),
        }))
    }
}

struct ExprScript {
    root: Arc<Node>,
    fields: Arc<Vec<FieldMapping>>,
    lookup: Arc<dyn FieldLookup>,
}

impl ValueScript for ExprScript {
    fn for_segment(&self, segment: &SegmentContext) -> Result<Box<dyn SegmentScript>, ScriptError> {
        let columns = self
            .fields
            .iter()
            .map(|m| self.lookup.numeric_values(m.data_type, segment, &m.index_name))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Box::new(ExprSegmentScript {
            root: Arc::clone(&self.root),
            fields: Arc::clone(&self.fields),
            columns,
        }))
    }
}

struct ExprSegmentScript {
    root: Arc<Node>,
    fields: Arc<Vec<FieldMapping>>,
    columns: Vec<Arc<dyn NumericValues>>,
}

impl ExprSegmentScript {
    fn eval(&self, node: &Node, doc: DocId) -> Result<f64, ScriptError> {
        match node {
            Node::Const(v) => Ok(*v),
            Node::Slot(slot) => {
                self.columns[*slot]
                    .first(doc)
                    .ok_or_else(|| ScriptError::MissingValue {
                        field: self.fields[*slot].name.clone(),
                        doc,
                    })
            }
            Node::Neg(inner) => Ok(-self.eval(inner, doc)?),
            Node::Binary(op, lhs, rhs) => Ok(op.apply(self.eval(lhs, doc)?, self.eval(rhs, doc)?)),
        }
    }
}

impl SegmentScript for ExprSegmentScript {
    fn evaluate(&mut self, doc: DocId) -> Result<f64, ScriptError> {
        let root = Arc::clone(&self.root);
        self.eval(&root, doc)
    }
}
