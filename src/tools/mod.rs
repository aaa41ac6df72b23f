//! Tool registry
//!
//! Tools are deterministic, side-effect-free operations. A model tool call
//! is decoded into a closed `ToolRequest`, executed, and reported back as a
//! `ToolOutcome`; the orchestrator decides what reaches session state.

pub mod finance;
pub mod math;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::AgentConfig;
use crate::error::ToolError;
use crate::models::ToolCall;

pub use finance::{format_amount, BudgetReport, ExpenseReport, SavingsGoal, UsernameReport};
pub use math::MathOperation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Budget,
    LogExpenses,
    MathTool,
    SetUsername,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [
        ToolKind::SetUsername,
        ToolKind::Budget,
        ToolKind::LogExpenses,
        ToolKind::MathTool,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::Budget => "budget",
            ToolKind::LogExpenses => "log_expenses",
            ToolKind::MathTool => "math_tool",
            ToolKind::SetUsername => "set_username",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolKind::Budget => {
                "Allocate a budget from the user's income and savings goal. \
                 The savings goal is a number or a percentage string such as \"40%\"."
            }
            ToolKind::LogExpenses => "Log one or more expenses and return their total.",
            ToolKind::MathTool => {
                "Perform add, subtract, multiply or divide over a list of numbers, left to right."
            }
            ToolKind::SetUsername => "Set the user's preferred name.",
        }
    }

    fn parameters(&self) -> Value {
        match self {
            ToolKind::Budget => json!({
                "type": "object",
                "properties": {
                    "income": {"type": "number", "description": "Total income, must be positive"},
                    "savings_goal": {
                        "anyOf": [{"type": "number"}, {"type": "string", "pattern": "^[0-9.]+%$"}],
                        "description": "Absolute savings target or a percentage like \"20%\""
                    },
                    "currency": {"type": "string", "description": "Currency code, e.g. NGN"}
                },
                "required": ["income", "savings_goal"]
            }),
            ToolKind::LogExpenses => json!({
                "type": "object",
                "properties": {
                    "expenses": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "amount": {"type": "number"},
                                "category": {"type": "string"},
                                "date": {"type": "string"}
                            },
                            "required": ["amount", "category"]
                        }
                    },
                    "currency": {"type": "string"}
                },
                "required": ["expenses"]
            }),
            ToolKind::MathTool => json!({
                "type": "object",
                "properties": {
                    "numbers": {"type": "array", "items": {"type": "number"}},
                    "operation": {"type": "string", "enum": ["add", "subtract", "multiply", "divide"]}
                },
                "required": ["numbers", "operation"]
            }),
            ToolKind::SetUsername => json!({
                "type": "object",
                "properties": {
                    "username": {"type": "string"}
                },
                "required": ["username"]
            }),
        }
    }
}

/// Function definition bound to model calls.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

//
// ================= Requests =================
//

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BudgetArgs {
    pub income: f64,
    pub savings_goal: SavingsGoal,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExpenseArgs {
    pub expenses: Vec<Value>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MathArgs {
    pub numbers: Vec<f64>,
    pub operation: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UsernameArgs {
    pub username: String,
}

/// A decoded tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    Budget(BudgetArgs),
    LogExpenses(ExpenseArgs),
    Math(MathArgs),
    SetUsername(UsernameArgs),
}

impl ToolRequest {
    /// Decode a raw tool call. Unknown names and malformed arguments are errors.
    pub fn parse(call: &ToolCall) -> Result<Self, ToolError> {
        let kind = ToolKind::from_name(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;
        let args = decode_args(kind, &call.args)?;

        let request = match kind {
            ToolKind::Budget => ToolRequest::Budget(from_args(kind, args)?),
            ToolKind::LogExpenses => ToolRequest::LogExpenses(from_args(kind, args)?),
            ToolKind::MathTool => ToolRequest::Math(from_args(kind, args)?),
            ToolKind::SetUsername => ToolRequest::SetUsername(from_args(kind, args)?),
        };

        Ok(request)
    }
}

/// Arguments must be an object; a JSON-encoded object string is accepted too.
fn decode_args(kind: ToolKind, args: &Value) -> Result<Value, ToolError> {
    let decoded = match args {
        Value::String(encoded) => serde_json::from_str::<Value>(encoded).map_err(|e| {
            ToolError::invalid(format!("Invalid arguments for {}: {}", kind.name(), e))
        })?,
        other => other.clone(),
    };

    if decoded.is_object() {
        Ok(decoded)
    } else {
        Err(ToolError::invalid(format!(
            "Arguments for {} must be a JSON object.",
            kind.name()
        )))
    }
}

fn from_args<T: serde::de::DeserializeOwned>(kind: ToolKind, args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args)
        .map_err(|e| ToolError::invalid(format!("Invalid arguments for {}: {}", kind.name(), e)))
}

//
// ================= Outcomes =================
//

#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Budget(BudgetReport),
    Expenses(ExpenseReport),
    Math(f64),
    Username(UsernameReport),
}

impl ToolOutcome {
    /// Text reported back to the model in the tool-result transcript entry.
    pub fn message(&self) -> String {
        match self {
            ToolOutcome::Budget(report) => report.message.clone(),
            ToolOutcome::Expenses(report) => report.message.clone(),
            ToolOutcome::Math(result) => result.to_string(),
            ToolOutcome::Username(report) => report.message.clone(),
        }
    }
}

/// Transcript text for a failed call.
pub fn failure_message(tool_name: &str, error: &ToolError) -> String {
    match error {
        ToolError::UnknownTool(name) => format!("Error: Invalid tool {} requested", name),
        other => format!("Error: Tool {} failed with {}", tool_name, other),
    }
}

//
// ================= Registry =================
//

/// Executes decoded requests. Holds only immutable defaults.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    currency_default: String,
}

impl ToolRegistry {
    pub fn new(currency_default: impl Into<String>) -> Self {
        Self {
            currency_default: currency_default.into(),
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.currency_default.clone())
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        ToolKind::ALL
            .iter()
            .map(|kind| ToolDefinition {
                name: kind.name(),
                description: kind.description(),
                parameters: kind.parameters(),
            })
            .collect()
    }

    pub fn execute(&self, request: &ToolRequest) -> Result<ToolOutcome, ToolError> {
        match request {
            ToolRequest::Budget(args) => {
                finance::budget(args.income, &args.savings_goal, self.currency(&args.currency))
                    .map(ToolOutcome::Budget)
            }
            ToolRequest::LogExpenses(args) => {
                finance::log_expenses(&args.expenses, self.currency(&args.currency))
                    .map(ToolOutcome::Expenses)
            }
            ToolRequest::Math(args) => {
                math::math_tool(&args.numbers, &args.operation).map(ToolOutcome::Math)
            }
            ToolRequest::SetUsername(args) => {
                finance::set_username(&args.username).map(ToolOutcome::Username)
            }
        }
    }

    /// Decode and execute a raw call in one step.
    pub fn dispatch(&self, call: &ToolCall) -> Result<(ToolRequest, ToolOutcome), ToolError> {
        let request = ToolRequest::parse(call)?;
        let outcome = self.execute(&request)?;
        Ok((request, outcome))
    }

    fn currency<'a>(&'a self, requested: &'a Option<String>) -> &'a str {
        requested
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.currency_default)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CURRENCY)
    }
}
