//! Budgeting, expense logging and username tools
//!
//! Pure functions: they read their arguments and return a report.
//! Merging reports into session state is the orchestrator's job.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;
use crate::models::Expense;

lazy_static! {
    /// Unsigned decimal: digits with an optional fraction.
    static ref PERCENT_NUMBER: Regex =
        Regex::new(r"^\d+(\.\d+)?$").expect("invalid PERCENT_NUMBER regex");
}

/// Savings goal as supplied by the model: an absolute amount or `"<n>%"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SavingsGoal {
    Amount(f64),
    Percentage(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetReport {
    pub income: f64,
    pub savings: f64,
    pub budget_for_expenses: f64,
    pub currency: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseReport {
    pub expense: f64,
    pub expenses: Vec<Expense>,
    pub currency: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsernameReport {
    pub username: String,
    pub message: String,
}

/// Allocate a budget from income and a savings goal.
pub fn budget(income: f64, savings_goal: &SavingsGoal, currency: &str) -> Result<BudgetReport, ToolError> {
    if !income.is_finite() || income <= 0.0 {
        return Err(ToolError::invalid("Income must be positive."));
    }

    let savings = match savings_goal {
        SavingsGoal::Percentage(raw) => income * parse_percentage(raw)? / 100.0,
        SavingsGoal::Amount(amount) => {
            if !amount.is_finite() || *amount < 0.0 {
                return Err(ToolError::invalid("Savings goal must be non-negative."));
            }
            *amount
        }
    };

    if savings > income {
        return Err(ToolError::invalid("Savings goal cannot exceed income."));
    }

    let budget_for_expenses = income - savings;

    Ok(BudgetReport {
        income,
        savings,
        budget_for_expenses,
        currency: currency.to_string(),
        message: format!(
            "Budget created! Income: {} {cur}, Savings: {} {cur}, Expenses: {} {cur}",
            format_amount(income),
            format_amount(savings),
            format_amount(budget_for_expenses),
            cur = currency
        ),
    })
}

/// Percentage in [0, 100] from a `"<number>%"` string.
fn parse_percentage(raw: &str) -> Result<f64, ToolError> {
    let trimmed = raw.trim();
    let Some(number) = trimmed.strip_suffix('%') else {
        return Err(ToolError::invalid("Savings goal percentage must end with '%'."));
    };

    let number = number.trim();
    if !PERCENT_NUMBER.is_match(number) {
        return Err(ToolError::invalid("Invalid savings goal percentage."));
    }

    match number.parse::<f64>() {
        Ok(pct) if pct.is_finite() && (0.0..=100.0).contains(&pct) => Ok(pct),
        _ => Err(ToolError::invalid("Invalid savings goal percentage.")),
    }
}

/// Validate expense entries and total them.
///
/// Entries arrive as raw JSON so that a failure can name the offending entry.
pub fn log_expenses(entries: &[Value], currency: &str) -> Result<ExpenseReport, ToolError> {
    if entries.is_empty() {
        return Err(ToolError::invalid("At least one expense must be provided."));
    }

    let mut expenses = Vec::with_capacity(entries.len());
    let mut total = 0.0;

    for (index, entry) in entries.iter().enumerate() {
        let expense = parse_expense(index + 1, entry)?;
        total += expense.amount;
        expenses.push(expense);
    }

    Ok(ExpenseReport {
        expense: total,
        expenses,
        currency: currency.to_string(),
        message: format!("Expenses logged! Total: {} {}", format_amount(total), currency),
    })
}

fn parse_expense(position: usize, entry: &Value) -> Result<Expense, ToolError> {
    let Some(fields) = entry.as_object() else {
        return Err(ToolError::invalid(format!(
            "Expense entry {} must be an object with 'amount' and 'category'.",
            position
        )));
    };

    let category = fields
        .get("category")
        .and_then(Value::as_str)
        .filter(|c| !c.trim().is_empty());

    let amount = fields
        .get("amount")
        .and_then(Value::as_f64)
        .filter(|a| a.is_finite() && *a > 0.0);

    let Some(amount) = amount else {
        return Err(ToolError::invalid(format!(
            "Expense amount must be a positive number. Entry {} ({}) is invalid.",
            position,
            category.unwrap_or("uncategorized")
        )));
    };

    let Some(category) = category else {
        return Err(ToolError::invalid(format!(
            "Expense category must be a non-empty string. Entry {} is invalid.",
            position
        )));
    };

    let date = match fields.get("date") {
        None | Some(Value::Null) => None,
        Some(Value::String(date)) => Some(date.clone()),
        Some(_) => {
            return Err(ToolError::invalid(format!(
                "Expense date must be a string. Entry {} is invalid.",
                position
            )))
        }
    };

    Ok(Expense {
        amount,
        category: category.to_string(),
        date,
    })
}

pub fn set_username(username: &str) -> Result<UsernameReport, ToolError> {
    if username.trim().is_empty() {
        return Err(ToolError::invalid("Username cannot be empty."));
    }

    Ok(UsernameReport {
        username: username.to_string(),
        message: format!("Username set to {}", username),
    })
}

/// Two decimals with thousands separators: `1234567.5` → `1,234,567.50`.
pub fn format_amount(value: f64) -> String {
    let formatted = format!("{:.2}", value.abs());
    let (whole, fraction) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3 + 4);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let negative = value < 0.0 && formatted.chars().any(|c| c.is_ascii_digit() && c != '0');
    format!("{}{}.{}", if negative { "-" } else { "" }, grouped, fraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_budget_percentage_goal() {
        let report = budget(500_000.0, &SavingsGoal::Percentage("20%".into()), "NGN").unwrap();
        assert_eq!(report.savings, 100_000.0);
        assert_eq!(report.budget_for_expenses, 400_000.0);
        assert!(report.message.contains("100,000.00 NGN"));
        assert_eq!(
            report.message,
            "Budget created! Income: 500,000.00 NGN, Savings: 100,000.00 NGN, Expenses: 400,000.00 NGN"
        );
    }

    #[test]
    fn test_budget_fixed_goal_balances() {
        for (income, goal) in [(10_000.0, 2_000.0), (750.0, 0.0), (1_234.0, 1_234.0), (99.0, 33.0)] {
            let report = budget(income, &SavingsGoal::Amount(goal), "USD").unwrap();
            assert_eq!(report.savings + report.budget_for_expenses, income);
        }
    }

    #[test]
    fn test_budget_percentage_bounds() {
        for pct in [0.0, 25.0, 40.0, 100.0] {
            let report = budget(10_000.0, &SavingsGoal::Percentage(format!("{}%", pct)), "NGN").unwrap();
            assert_eq!(report.savings, 10_000.0 * pct / 100.0);
        }

        let report = budget(10_000.0, &SavingsGoal::Percentage(" 12.5 %".into()), "NGN").unwrap();
        assert_eq!(report.savings, 1_250.0);
    }

    #[test]
    fn test_budget_rejects_invalid_input() {
        let cases = [
            (-1000.0, SavingsGoal::Amount(200.0), "Income must be positive."),
            (0.0, SavingsGoal::Amount(0.0), "Income must be positive."),
            (10_000.0, SavingsGoal::Percentage("invalid%".into()), "Invalid savings goal percentage."),
            (10_000.0, SavingsGoal::Percentage("120%".into()), "Invalid savings goal percentage."),
            (10_000.0, SavingsGoal::Percentage("-5%".into()), "Invalid savings goal percentage."),
            (10_000.0, SavingsGoal::Percentage("+20%".into()), "Invalid savings goal percentage."),
            (10_000.0, SavingsGoal::Percentage("1e1%".into()), "Invalid savings goal percentage."),
            (10_000.0, SavingsGoal::Percentage(".5%".into()), "Invalid savings goal percentage."),
            (10_000.0, SavingsGoal::Percentage("%".into()), "Invalid savings goal percentage."),
            (10_000.0, SavingsGoal::Percentage("40".into()), "Savings goal percentage must end with '%'."),
            (10_000.0, SavingsGoal::Amount(-1.0), "Savings goal must be non-negative."),
            (10_000.0, SavingsGoal::Amount(10_001.0), "Savings goal cannot exceed income."),
        ];

        for (income, goal, expected) in cases {
            assert_eq!(budget(income, &goal, "NGN"), Err(ToolError::invalid(expected)));
        }
    }

    #[test]
    fn test_log_expenses_totals() {
        let entries = vec![
            json!({"amount": 500.0, "category": "Food"}),
            json!({"amount": 300, "category": "Transport", "date": "2025-01-04"}),
        ];
        let report = log_expenses(&entries, "NGN").unwrap();
        assert_eq!(report.expense, 800.0);
        assert_eq!(report.expenses.len(), 2);
        assert_eq!(report.expenses[1].date.as_deref(), Some("2025-01-04"));
        assert_eq!(report.message, "Expenses logged! Total: 800.00 NGN");
    }

    #[test]
    fn test_log_expenses_rejects_empty_and_non_positive() {
        assert_eq!(
            log_expenses(&[], "NGN"),
            Err(ToolError::invalid("At least one expense must be provided."))
        );

        let err = log_expenses(
            &[json!({"amount": 10.0, "category": "Food"}), json!({"amount": -100.0, "category": "Rent"})],
            "NGN",
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Expense amount must be a positive number."));
        assert!(message.contains("Entry 2 (Rent)"));

        assert!(log_expenses(&[json!({"amount": "50", "category": "Food"})], "NGN").is_err());
        assert!(log_expenses(&[json!({"amount": 50.0, "category": "  "})], "NGN").is_err());
    }

    #[test]
    fn test_set_username() {
        let report = set_username("testuser").unwrap();
        assert_eq!(report.username, "testuser");
        assert_eq!(report.message, "Username set to testuser");
        assert_eq!(set_username("   "), Err(ToolError::invalid("Username cannot be empty.")));
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(0.0), "0.00");
        assert_eq!(format_amount(999.5), "999.50");
        assert_eq!(format_amount(1_000.0), "1,000.00");
        assert_eq!(format_amount(1_234_567.891), "1,234,567.89");
        assert_eq!(format_amount(-25_000.0), "-25,000.00");
        assert_eq!(format_amount(-0.001), "0.00");
    }
}
