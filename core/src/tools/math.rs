use crate::agent::ToolParameter;
use crate::tools::typed_args;
use crate::traits::{Tool, ToolArguments};
use anyhow::anyhow;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
struct IntPair {
    first_int: i64,
    second_int: i64,
}

#[derive(Debug, Deserialize)]
struct Power {
    base: i64,
    exponent: i64,
}

fn int_pair_parameters() -> Vec<ToolParameter> {
    vec![
        ToolParameter::integer("first_int", "The first integer"),
        ToolParameter::integer("second_int", "The second integer"),
    ]
}

pub struct MultiplyTool;

#[async_trait]
impl Tool for MultiplyTool {
    fn name(&self) -> &str {
        "multiply"
    }

    fn description(&self) -> &str {
        "Multiply two integers together."
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        int_pair_parameters()
    }

    async fn execute(&self, args: &ToolArguments) -> anyhow::Result<Value> {
        let IntPair {
            first_int,
            second_int,
        } = typed_args(args)?;
        first_int
            .checked_mul(second_int)
            .map(|v| json!(v))
            .ok_or_else(|| anyhow!("{} * {} overflows", first_int, second_int))
    }
}

pub struct AddTool;

#[async_trait]
impl Tool for AddTool {
    fn name(&self) -> &str {
        "add"
    }

    fn description(&self) -> &str {
        "Add two integers."
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        int_pair_parameters()
    }

    async fn execute(&self, args: &ToolArguments) -> anyhow::Result<Value> {
        let IntPair {
            first_int,
            second_int,
        } = typed_args(args)?;
        first_int
            .checked_add(second_int)
            .map(|v| json!(v))
            .ok_or_else(|| anyhow!("{} + {} overflows", first_int, second_int))
    }
}

pub struct ExponentiateTool;

#[async_trait]
impl Tool for ExponentiateTool {
    fn name(&self) -> &str {
        "exponentiate"
    }

    fn description(&self) -> &str {
        "Raise the base to the exponent power."
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::integer("base", "The base"),
            ToolParameter::integer("exponent", "The non-negative exponent"),
        ]
    }

    async fn execute(&self, args: &ToolArguments) -> anyhow::Result<Value> {
        let Power { base, exponent } = typed_args(args)?;
        let exp = u32::try_from(exponent)
            .map_err(|_| anyhow!("exponent must be a non-negative 32-bit integer, got {}", exponent))?;
        base.checked_pow(exp)
            .map(|v| json!(v))
            .ok_or_else(|| anyhow!("{}^{} overflows", base, exponent))
    }
}
