//! Filter expression compiler.
//!
//! Search requests may carry a LangChain structured-query expression as JSON
//! (`SearchParam::langchain_expr_json`). During search `init()` the
//! expression is parsed, optionally type-checked against the index's scalar
//! schema, and compiled into the coprocessor blob shipped with every search
//! RPC. Regions evaluate the blob server-side.
//!
//! Supported nodes:
//! - `{"type": "comparison", "comparator": "eq|ne|lt|lte|gt|gte",
//!    "attribute": "...", "value": ...}`
//! - `{"type": "operator", "operator": "and|or|not", "arguments": [...]}`

use crate::error::{ClientError, Result};
use lattice_core::{ScalarFieldType, ScalarSchema};
use serde_json::Value;

/// Comparison operators on scalar attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Comparator {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "eq" => Ok(Comparator::Eq),
            "ne" => Ok(Comparator::Ne),
            "lt" => Ok(Comparator::Lt),
            "lte" => Ok(Comparator::Lte),
            "gt" => Ok(Comparator::Gt),
            "gte" => Ok(Comparator::Gte),
            other => Err(ClientError::InvalidExpression(format!(
                "unknown comparator: {other}"
            ))),
        }
    }

    fn opcode(self) -> u8 {
        match self {
            Comparator::Eq => 0x01,
            Comparator::Ne => 0x02,
            Comparator::Lt => 0x03,
            Comparator::Lte => 0x04,
            Comparator::Gt => 0x05,
            Comparator::Gte => 0x06,
        }
    }
}

/// Logical connectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
    Not,
}

impl Connective {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "and" => Ok(Connective::And),
            "or" => Ok(Connective::Or),
            "not" => Ok(Connective::Not),
            other => Err(ClientError::InvalidExpression(format!(
                "unknown operator: {other}"
            ))),
        }
    }

    fn opcode(self) -> u8 {
        match self {
            Connective::And => 0x10,
            Connective::Or => 0x11,
            Connective::Not => 0x12,
        }
    }
}

/// A literal operand of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Bool(bool),
    Int64(i64),
    Double(f64),
    String(String),
}

impl Operand {
    fn field_type(&self) -> ScalarFieldType {
        match self {
            Operand::Bool(_) => ScalarFieldType::Bool,
            Operand::Int64(_) => ScalarFieldType::Int64,
            Operand::Double(_) => ScalarFieldType::Double,
            Operand::String(_) => ScalarFieldType::String,
        }
    }

    fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(Operand::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Operand::Int64(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Operand::Double(f))
                } else {
                    Err(ClientError::InvalidExpression(format!(
                        "unrepresentable number: {n}"
                    )))
                }
            }
            Value::String(s) => Ok(Operand::String(s.clone())),
            other => Err(ClientError::InvalidExpression(format!(
                "unsupported literal: {other}"
            ))),
        }
    }
}

/// Parsed filter expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Comparison {
        comparator: Comparator,
        attribute: String,
        operand: Operand,
    },
    Operator {
        connective: Connective,
        arguments: Vec<FilterExpr>,
    },
}

/// Compiles an expression JSON string into the coprocessor blob.
///
/// When `schema` is present, attribute names and operand types are checked
/// against it; without a schema, attributes pass through untyped.
pub fn compile(expr_json: &str, schema: Option<&ScalarSchema>) -> Result<Vec<u8>> {
    let value: Value = serde_json::from_str(expr_json)
        .map_err(|e| ClientError::InvalidExpression(e.to_string()))?;
    let expr = parse_node(&value)?;
    if let Some(schema) = schema {
        check_schema(&expr, schema)?;
    }

    let mut blob = Vec::new();
    encode(&expr, &mut blob);
    Ok(blob)
}

fn parse_node(value: &Value) -> Result<FilterExpr> {
    let obj = value.as_object().ok_or_else(|| {
        ClientError::InvalidExpression("expression node must be an object".to_string())
    })?;
    let node_type = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::InvalidExpression("node is missing \"type\"".to_string()))?;

    match node_type {
        "comparison" => {
            let comparator = Comparator::parse(str_field(obj, "comparator")?)?;
            let attribute = str_field(obj, "attribute")?.to_string();
            let operand = Operand::parse(obj.get("value").ok_or_else(|| {
                ClientError::InvalidExpression("comparison is missing \"value\"".to_string())
            })?)?;
            Ok(FilterExpr::Comparison {
                comparator,
                attribute,
                operand,
            })
        }
        "operator" => {
            let connective = Connective::parse(str_field(obj, "operator")?)?;
            let args = obj
                .get("arguments")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    ClientError::InvalidExpression("operator is missing \"arguments\"".to_string())
                })?;
            if args.is_empty() {
                return Err(ClientError::InvalidExpression(
                    "operator has no arguments".to_string(),
                ));
            }
            if connective == Connective::Not && args.len() != 1 {
                return Err(ClientError::InvalidExpression(format!(
                    "\"not\" takes one argument, got {}",
                    args.len()
                )));
            }
            let arguments = args.iter().map(parse_node).collect::<Result<Vec<_>>>()?;
            Ok(FilterExpr::Operator {
                connective,
                arguments,
            })
        }
        other => Err(ClientError::InvalidExpression(format!(
            "unknown node type: {other}"
        ))),
    }
}

fn str_field<'a>(obj: &'a serde_json::Map<String, Value>, key: &str) -> Result<&'a str> {
    obj.get(key).and_then(Value::as_str).ok_or_else(|| {
        ClientError::InvalidExpression(format!("node is missing \"{key}\""))
    })
}

fn check_schema(expr: &FilterExpr, schema: &ScalarSchema) -> Result<()> {
    match expr {
        FilterExpr::Comparison {
            attribute, operand, ..
        } => {
            let column = schema.column(attribute).ok_or_else(|| {
                ClientError::InvalidExpression(format!(
                    "attribute \"{attribute}\" not in scalar schema"
                ))
            })?;
            let operand_type = operand.field_type();
            // An integer literal may compare against a double column.
            let compatible = operand_type == column.field_type
                || (operand_type == ScalarFieldType::Int64
                    && column.field_type == ScalarFieldType::Double);
            if !compatible {
                return Err(ClientError::InvalidExpression(format!(
                    "attribute \"{attribute}\" is {}, literal is {}",
                    column.field_type, operand_type
                )));
            }
            Ok(())
        }
        FilterExpr::Operator { arguments, .. } => {
            arguments.iter().try_for_each(|arg| check_schema(arg, schema))
        }
    }
}

/// Postorder encoding: children first, then the node opcode. Comparisons
/// carry the attribute and the literal inline.
fn encode(expr: &FilterExpr, out: &mut Vec<u8>) {
    match expr {
        FilterExpr::Comparison {
            comparator,
            attribute,
            operand,
        } => {
            out.push(comparator.opcode());
            out.extend_from_slice(&(attribute.len() as u16).to_be_bytes());
            out.extend_from_slice(attribute.as_bytes());
            match operand {
                Operand::Bool(b) => {
                    out.push(0x20);
                    out.push(*b as u8);
                }
                Operand::Int64(i) => {
                    out.push(0x21);
                    out.extend_from_slice(&i.to_be_bytes());
                }
                Operand::Double(f) => {
                    out.push(0x22);
                    out.extend_from_slice(&f.to_be_bytes());
                }
                Operand::String(s) => {
                    out.push(0x23);
                    out.extend_from_slice(&(s.len() as u16).to_be_bytes());
                    out.extend_from_slice(s.as_bytes());
                }
            }
        }
        FilterExpr::Operator {
            connective,
            arguments,
        } => {
            for arg in arguments {
                encode(arg, out);
            }
            out.push(connective.opcode());
            out.push(arguments.len() as u8);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::ScalarColumn;

    fn schema() -> ScalarSchema {
        ScalarSchema {
            cols: vec![
                ScalarColumn {
                    key: "color".to_string(),
                    field_type: ScalarFieldType::String,
                    speed: true,
                },
                ScalarColumn {
                    key: "weight".to_string(),
                    field_type: ScalarFieldType::Double,
                    speed: false,
                },
            ],
        }
    }

    #[test]
    fn test_compile_comparison() {
        let blob = compile(
            r#"{"type":"comparison","comparator":"eq","attribute":"color","value":"red"}"#,
            Some(&schema()),
        )
        .unwrap();
        assert_eq!(blob[0], 0x01); // eq
        assert!(!blob.is_empty());
    }

    #[test]
    fn test_compile_nested_operator() {
        let json = r#"{
            "type": "operator", "operator": "and",
            "arguments": [
                {"type":"comparison","comparator":"eq","attribute":"color","value":"red"},
                {"type":"comparison","comparator":"gte","attribute":"weight","value":2}
            ]
        }"#;
        let blob = compile(json, Some(&schema())).unwrap();
        // Postorder: the connective opcode and arity close the blob.
        assert_eq!(blob[blob.len() - 2], 0x10); // and
        assert_eq!(blob[blob.len() - 1], 2);
    }

    #[test]
    fn test_unknown_attribute_rejected_with_schema() {
        let json = r#"{"type":"comparison","comparator":"eq","attribute":"shape","value":"round"}"#;
        assert!(matches!(
            compile(json, Some(&schema())),
            Err(ClientError::InvalidExpression(_))
        ));
        // Without a schema the attribute passes through untyped.
        assert!(compile(json, None).is_ok());
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let json = r#"{"type":"comparison","comparator":"eq","attribute":"weight","value":"heavy"}"#;
        assert!(matches!(
            compile(json, Some(&schema())),
            Err(ClientError::InvalidExpression(_))
        ));
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let json = r#"{"type":"operator","operator":"xor","arguments":[
            {"type":"comparison","comparator":"eq","attribute":"color","value":"red"}]}"#;
        assert!(matches!(
            compile(json, None),
            Err(ClientError::InvalidExpression(_))
        ));
    }

    #[test]
    fn test_not_requires_single_argument() {
        let json = r#"{"type":"operator","operator":"not","arguments":[
            {"type":"comparison","comparator":"eq","attribute":"color","value":"red"},
            {"type":"comparison","comparator":"eq","attribute":"color","value":"blue"}]}"#;
        assert!(matches!(
            compile(json, None),
            Err(ClientError::InvalidExpression(_))
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            compile("{not json", None),
            Err(ClientError::InvalidExpression(_))
        ));
    }
}
