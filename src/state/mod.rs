//! Session state
//!
//! One `SessionState` per (user, thread). Only the orchestrator mutates it,
//! through `StateUpdate`s built from tool outcomes. Raw snapshots loaded
//! from storage go through `from_raw`, which resets bad fields to defaults
//! instead of failing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::models::{Expense, Message};
use crate::tools::{ToolOutcome, ToolRequest};

/// Initial values for a fresh session.
#[derive(Debug, Clone, PartialEq)]
pub struct StateDefaults {
    pub username: String,
    pub income: f64,
    pub budget_for_expenses: f64,
    pub expense: f64,
    pub savings_goal: f64,
    pub savings: f64,
    pub currency: String,
    pub summary: String,
}

impl Default for StateDefaults {
    fn default() -> Self {
        Self {
            username: String::new(),
            income: 0.0,
            budget_for_expenses: 0.0,
            expense: 0.0,
            savings_goal: 0.0,
            savings: 0.0,
            currency: String::new(),
            summary: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub username: String,
    pub income: f64,
    /// May go negative once expenses overrun the allocation.
    pub budget_for_expenses: f64,
    pub expense: f64,
    pub expenses: Vec<Expense>,
    pub savings_goal: f64,
    pub savings: f64,
    pub currency: String,
    pub summary: String,
    pub messages: Vec<Message>,
}

impl SessionState {
    pub fn new(defaults: &StateDefaults) -> Self {
        Self {
            username: defaults.username.clone(),
            income: defaults.income,
            budget_for_expenses: defaults.budget_for_expenses,
            expense: defaults.expense,
            expenses: Vec::new(),
            savings_goal: defaults.savings_goal,
            savings: defaults.savings,
            currency: defaults.currency.clone(),
            summary: defaults.summary.clone(),
            messages: Vec::new(),
        }
    }

    /// Normalize a raw snapshot into a valid state.
    ///
    /// Scalars of the wrong type (or negative, where the field is
    /// non-negative) fall back to their default. Ledger and transcript
    /// entries that do not decode are dropped.
    pub fn from_raw(raw: &Value, defaults: &StateDefaults) -> Self {
        let empty = Map::new();
        let fields = match raw.as_object() {
            Some(fields) => fields,
            None => {
                warn!("Session snapshot is not an object, using defaults");
                &empty
            }
        };

        Self {
            username: text_field(fields, "username", &defaults.username),
            income: amount_field(fields, "income", defaults.income, true),
            budget_for_expenses: amount_field(
                fields,
                "budget_for_expenses",
                defaults.budget_for_expenses,
                false,
            ),
            expense: amount_field(fields, "expense", defaults.expense, true),
            expenses: list_field(fields, "expenses", valid_expense),
            savings_goal: amount_field(fields, "savings_goal", defaults.savings_goal, true),
            savings: amount_field(fields, "savings", defaults.savings, true),
            currency: text_field(fields, "currency", &defaults.currency),
            summary: text_field(fields, "summary", &defaults.summary),
            messages: list_field(fields, "messages", |_: &Message| true),
        }
    }

    pub fn merge(&mut self, update: StateUpdate) {
        if let Some(username) = update.username {
            self.username = username;
        }

        if let Some(budget) = update.budget {
            self.income = budget.income;
            self.savings = budget.savings;
            self.savings_goal = budget.savings;
            self.budget_for_expenses = budget.budget_for_expenses;
        }

        self.expense += update.expense_total;
        self.expenses.extend(update.new_expenses);

        if let Some(currency) = update.currency {
            self.currency = currency;
        }
    }

    /// Snapshot with a content-only transcript, as written to checkpoints.
    pub fn persisted(&self) -> Self {
        Self {
            messages: self.messages.iter().map(Message::content_only).collect(),
            ..self.clone()
        }
    }

    /// Keep only the `keep` most recent transcript records.
    pub fn trim_transcript(&mut self, keep: usize) {
        let excess = self.messages.len().saturating_sub(keep);
        if excess > 0 {
            self.messages.drain(..excess);
        }
    }
}

fn text_field(fields: &Map<String, Value>, name: &str, default: &str) -> String {
    match fields.get(name) {
        Some(Value::String(value)) => value.clone(),
        None | Some(Value::Null) => default.to_string(),
        Some(other) => {
            warn!(field = name, value = %other, "Resetting mistyped field to default");
            default.to_string()
        }
    }
}

fn amount_field(fields: &Map<String, Value>, name: &str, default: f64, non_negative: bool) -> f64 {
    match fields.get(name) {
        None | Some(Value::Null) => default,
        Some(value) => match value.as_f64() {
            Some(amount) if amount.is_finite() && (!non_negative || amount >= 0.0) => amount,
            _ => {
                warn!(field = name, value = %value, "Resetting invalid field to default");
                default
            }
        },
    }
}

fn list_field<T, F>(fields: &Map<String, Value>, name: &str, keep: F) -> Vec<T>
where
    T: serde::de::DeserializeOwned,
    F: Fn(&T) -> bool,
{
    let Some(value) = fields.get(name) else {
        return Vec::new();
    };

    let Some(entries) = value.as_array() else {
        warn!(field = name, "Expected a list, resetting to empty");
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| match serde_json::from_value::<T>(entry.clone()) {
            Ok(item) if keep(&item) => Some(item),
            _ => {
                warn!(field = name, entry = %entry, "Dropping malformed entry");
                None
            }
        })
        .collect()
}

fn valid_expense(expense: &Expense) -> bool {
    expense.amount.is_finite() && expense.amount > 0.0 && !expense.category.trim().is_empty()
}

//
// ================= Updates =================
//

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetFigures {
    pub income: f64,
    pub savings: f64,
    pub budget_for_expenses: f64,
}

/// State changes accumulated over one batch of tool calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub username: Option<String>,
    pub budget: Option<BudgetFigures>,
    pub expense_total: f64,
    pub new_expenses: Vec<Expense>,
    pub currency: Option<String>,
}

impl StateUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fold a successful tool result into the pending update.
    pub fn absorb(&mut self, request: &ToolRequest, outcome: &ToolOutcome) {
        match (request, outcome) {
            (ToolRequest::Budget(_), ToolOutcome::Budget(report)) => {
                self.budget = Some(BudgetFigures {
                    income: report.income,
                    savings: report.savings,
                    budget_for_expenses: report.budget_for_expenses,
                });
                self.currency = Some(report.currency.clone());
            }
            (ToolRequest::LogExpenses(_), ToolOutcome::Expenses(report)) => {
                self.expense_total += report.expense;
                self.new_expenses.extend(report.expenses.iter().cloned());
                self.currency = Some(report.currency.clone());
            }
            // The raw argument is stored, not the echoed value.
            (ToolRequest::SetUsername(args), ToolOutcome::Username(_)) => {
                self.username = Some(args.username.clone());
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, ToolCall};
    use crate::tools::ToolRegistry;
    use serde_json::json;

    fn run(state: &mut SessionState, name: &str, args: Value) {
        let registry = ToolRegistry::new("NGN");
        let call = ToolCall {
            id: "c".to_string(),
            name: name.to_string(),
            args,
        };
        let (request, outcome) = registry.dispatch(&call).unwrap();
        let mut update = StateUpdate::default();
        update.absorb(&request, &outcome);
        state.merge(update);
    }

    #[test]
    fn test_new_state_uses_defaults() {
        let state = SessionState::new(&StateDefaults::default());
        assert_eq!(state.username, "");
        assert_eq!(state.income, 0.0);
        assert!(state.expenses.is_empty());
        assert!(state.messages.is_empty());
    }

    #[test]
    fn test_budget_then_expenses_preserves_allocation() {
        let mut state = SessionState::new(&StateDefaults::default());
        run(
            &mut state,
            "budget",
            json!({"income": 500000, "savings_goal": "20%", "currency": "NGN"}),
        );
        assert_eq!(state.savings, 100_000.0);
        assert_eq!(state.savings_goal, 100_000.0);
        assert_eq!(state.budget_for_expenses, 400_000.0);

        run(
            &mut state,
            "log_expenses",
            json!({"expenses": [{"amount": 50000, "category": "groceries"}], "currency": "NGN"}),
        );
        assert_eq!(state.expense, 50_000.0);
        assert_eq!(state.budget_for_expenses, 400_000.0);
        assert_eq!(state.currency, "NGN");
    }

    #[test]
    fn test_expense_merges_are_associative() {
        let a = json!({"amount": 1200.5, "category": "Food"});
        let b = json!({"amount": 300, "category": "Transport"});

        let mut sequential = SessionState::new(&StateDefaults::default());
        run(&mut sequential, "log_expenses", json!({"expenses": [a.clone()]}));
        run(&mut sequential, "log_expenses", json!({"expenses": [b.clone()]}));

        let mut batched = SessionState::new(&StateDefaults::default());
        run(&mut batched, "log_expenses", json!({"expenses": [a, b]}));

        assert_eq!(sequential.expense, batched.expense);
        assert_eq!(sequential.expenses, batched.expenses);
    }

    #[test]
    fn test_username_and_math_merges() {
        let mut state = SessionState::new(&StateDefaults::default());
        run(&mut state, "set_username", json!({"username": "Chinonso"}));
        assert_eq!(state.username, "Chinonso");

        let before = state.clone();
        run(&mut state, "math_tool", json!({"numbers": [1, 2], "operation": "add"}));
        assert_eq!(state, before);
    }

    #[test]
    fn test_from_raw_resets_invalid_fields() {
        let raw = json!({
            "username": 42,
            "income": "a lot",
            "expense": -10.0,
            "budget_for_expenses": -250.0,
            "savings": 100.0,
            "currency": "USD",
            "expenses": [
                {"amount": 50.0, "category": "Food"},
                {"amount": -3.0, "category": "Bad"},
                "garbage"
            ],
            "messages": [
                {"role": "user", "content": "hi"},
                {"role": "narrator", "content": "??"}
            ]
        });

        let state = SessionState::from_raw(&raw, &StateDefaults::default());
        assert_eq!(state.username, "");
        assert_eq!(state.income, 0.0);
        assert_eq!(state.expense, 0.0);
        assert_eq!(state.budget_for_expenses, -250.0);
        assert_eq!(state.savings, 100.0);
        assert_eq!(state.currency, "USD");
        assert_eq!(state.expenses.len(), 1);
        assert_eq!(state.messages, vec![Message::user("hi")]);
    }

    #[test]
    fn test_from_raw_non_object() {
        let state = SessionState::from_raw(&json!([1, 2, 3]), &StateDefaults::default());
        assert_eq!(state, SessionState::new(&StateDefaults::default()));
    }

    #[test]
    fn test_persisted_strips_tool_metadata() {
        let mut state = SessionState::new(&StateDefaults::default());
        state.messages.push(Message::assistant_with_tools(
            "",
            vec![ToolCall {
                id: "call1".to_string(),
                name: "budget".to_string(),
                args: json!({}),
            }],
        ));
        state.messages.push(Message::tool_result("call1", "Budget created!"));

        let persisted = state.persisted();
        assert!(persisted.messages.iter().all(|m| m.tool_calls.is_empty()));
        assert!(persisted.messages.iter().all(|m| m.tool_call_id.is_none()));
        assert_eq!(persisted.messages[1].role, Role::Tool);
        assert_eq!(persisted.messages[1].content, "Budget created!");
    }

    #[test]
    fn test_trim_transcript() {
        let mut state = SessionState::new(&StateDefaults::default());
        for i in 0..12 {
            state.messages.push(Message::user(format!("m{}", i)));
        }
        state.trim_transcript(4);
        assert_eq!(state.messages.len(), 4);
        assert_eq!(state.messages[0].content, "m8");

        state.trim_transcript(10);
        assert_eq!(state.messages.len(), 4);
    }
}
