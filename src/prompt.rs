//! System prompt template and formatter
//!
//! Templates use `$name` placeholders. Formatting never fails outward: on any
//! structural problem the raw template is returned unchanged.

use std::collections::HashMap;

use tracing::error;

use crate::config::AgentConfig;
use crate::state::SessionState;

const NO_SUMMARY: &str = "No prior conversation summary available.";
const UNKNOWN_USER: &str = "Unknown";

/// Default system prompt for the configured project.
pub fn default_template(config: &AgentConfig) -> String {
    let project = &config.project_name;

    format!(
        r#"{backstory}

### User Details:
- Username: $username
- Income: $income $currency
- Budget for Expenses: $budget_for_expenses $currency
- Total Expenses: $expense $currency
- Expenses List: $expenses
- Savings Goal: $savings_goal $currency
- Savings: $savings $currency
- Currency: $currency
- Conversation Summary: $summary

### Available Tools:
Use the tool-calling mechanism. Never write tool JSON in a reply and never do arithmetic by hand.
- set_username: {{"username": "string"}}
- budget: {{"income": number, "savings_goal": number or "percentage%", "currency": "code"}}
- log_expenses: {{"expenses": [{{"amount": number, "category": "string"}}], "currency": "code"}}
- math_tool: {{"numbers": [number, ...], "operation": "add|subtract|multiply|divide"}}

### Instructions:
1. If the username is empty or "Unknown", ask for the user's preferred name and call set_username. Do nothing else until it is set.
2. Once the username is set and income is 0.00, ask for income, savings goal (a number or a percentage such as "40%") and currency, then call budget.
3. Only log expenses or give insights when income is above zero. Log every mentioned expense in one log_expenses call using the session currency.
4. Use math_tool for every calculation. Quote tool figures exactly, with thousands separators.
5. If input is unclear or invalid (negative income, unknown currency), say what is wrong and ask again.
6. Stay within budgeting, expense tracking and savings. For anything else reply: "I'm {project}, here to help with your budget and expenses. Let's focus on your financial goals. How can I assist you?"
7. If the user says "exit" or "quit", reply: "Goodbye! Take care, cheers!"
8. Never mention your tools to the user.

Be friendly and concise. Suggest a next step when it helps."#,
        backstory = config.backstory,
        project = project,
    )
}

/// Substitute session values into `template`.
///
/// Returns `template` verbatim if any placeholder is unknown or a value
/// cannot be rendered.
pub fn format_system_prompt(template: &str, state: &SessionState, config: &AgentConfig) -> String {
    let values = match placeholder_values(state, config) {
        Ok(values) => values,
        Err(e) => {
            error!(error = %e, "Prompt formatting failed");
            return template.to_string();
        }
    };

    match substitute(template, &values) {
        Ok(prompt) => prompt,
        Err(placeholder) => {
            error!(placeholder = %placeholder, "Prompt formatting failed: unknown placeholder");
            template.to_string()
        }
    }
}

fn placeholder_values(
    state: &SessionState,
    config: &AgentConfig,
) -> serde_json::Result<HashMap<&'static str, String>> {
    let or_default = |value: &str, default: &str| {
        if value.is_empty() {
            default.to_string()
        } else {
            value.to_string()
        }
    };

    Ok(HashMap::from([
        ("username", or_default(state.username.as_str(), UNKNOWN_USER)),
        ("income", money(state.income)),
        ("budget_for_expenses", money(state.budget_for_expenses)),
        ("expense", money(state.expense)),
        ("expenses", serde_json::to_string(&state.expenses)?),
        ("savings_goal", money(state.savings_goal)),
        ("savings", money(state.savings)),
        ("currency", or_default(state.currency.as_str(), config.currency_default.as_str())),
        ("summary", or_default(state.summary.as_str(), NO_SUMMARY)),
    ]))
}

fn money(value: f64) -> String {
    format!("{:.2}", value)
}

/// Replace each `$identifier` (longest run of `[a-z_]`) with its value.
/// A `$` not followed by an identifier is kept as-is.
fn substitute(template: &str, values: &HashMap<&'static str, String>) -> Result<String, String> {
    let mut out = String::with_capacity(template.len() + 256);
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let len = after
            .find(|c: char| !(c.is_ascii_lowercase() || c == '_'))
            .unwrap_or(after.len());

        if len == 0 {
            out.push('$');
        } else {
            let name = &after[..len];
            match values.get(name) {
                Some(value) => out.push_str(value),
                None => return Err(name.to_string()),
            }
        }
        rest = &after[len..];
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Expense;
    use crate::state::StateDefaults;

    fn state() -> SessionState {
        SessionState::new(&StateDefaults::default())
    }

    #[test]
    fn test_format_with_defaults() {
        let config = AgentConfig::default();
        let prompt = format_system_prompt(&config.system_prompt, &state(), &config);

        assert!(prompt.contains("- Username: Unknown"));
        assert!(prompt.contains("- Income: 0.00 NGN"));
        assert!(prompt.contains("- Expenses List: []"));
        assert!(prompt.contains(NO_SUMMARY));
        assert!(!prompt.contains("$username"));
        assert!(prompt.contains("I'm Aza Man, here to help"));
    }

    #[test]
    fn test_format_with_session_values() {
        let config = AgentConfig::default();
        let mut state = state();
        state.username = "Chinonso".to_string();
        state.income = 500_000.0;
        state.expense = 50_000.0;
        state.expenses.push(Expense {
            amount: 50_000.0,
            category: "groceries".to_string(),
            date: None,
        });
        state.currency = "NGN".to_string();

        let prompt = format_system_prompt(&config.system_prompt, &state, &config);
        assert!(prompt.contains("Username: Chinonso"));
        assert!(prompt.contains("Income: 500000.00 NGN"));
        assert!(prompt.contains("Total Expenses: 50000.00 NGN"));
        assert!(prompt.contains(r#"[{"amount":50000.0,"category":"groceries"}]"#));
    }

    #[test]
    fn test_expense_placeholders_do_not_collide() {
        let config = AgentConfig::default();
        let mut state = state();
        state.expense = 12.5;

        let prompt = format_system_prompt("$expense|$expenses", &state, &config);
        assert_eq!(prompt, "12.50|[]");
    }

    #[test]
    fn test_unknown_placeholder_falls_back_to_template() {
        let config = AgentConfig::default();
        let template = "Hello $username, your $nickname is ready";
        assert_eq!(format_system_prompt(template, &state(), &config), template);
    }

    #[test]
    fn test_bare_dollar_is_literal() {
        let config = AgentConfig::default();
        assert_eq!(
            format_system_prompt("Costs $5 for $username", &state(), &config),
            "Costs $5 for Unknown"
        );
    }
}
