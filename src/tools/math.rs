//! Arithmetic over a list of operands

use crate::error::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOperation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl MathOperation {
    pub fn parse(operation: &str) -> Option<Self> {
        match operation.trim().to_lowercase().as_str() {
            "add" => Some(MathOperation::Add),
            "subtract" => Some(MathOperation::Subtract),
            "multiply" => Some(MathOperation::Multiply),
            "divide" => Some(MathOperation::Divide),
            _ => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            MathOperation::Add => "Add",
            MathOperation::Subtract => "Subtract",
            MathOperation::Multiply => "Multiply",
            MathOperation::Divide => "Divide",
        }
    }

    fn min_operands(&self) -> usize {
        match self {
            MathOperation::Add | MathOperation::Multiply => 1,
            MathOperation::Subtract | MathOperation::Divide => 2,
        }
    }
}

/// Left-to-right fold of `numbers` under `operation`.
pub fn math_tool(numbers: &[f64], operation: &str) -> Result<f64, ToolError> {
    if numbers.is_empty() {
        return Err(ToolError::invalid("At least one number is required."));
    }

    let op = MathOperation::parse(operation)
        .ok_or_else(|| ToolError::UnsupportedOperation(operation.to_string()))?;

    if numbers.len() < op.min_operands() {
        return Err(ToolError::invalid(format!(
            "{} requires at least two numbers.",
            op.label()
        )));
    }

    let (first, rest) = (numbers[0], &numbers[1..]);

    let result: f64 = match op {
        MathOperation::Add => numbers.iter().sum(),
        MathOperation::Multiply => numbers.iter().product(),
        MathOperation::Subtract => rest.iter().fold(first, |acc, n| acc - n),
        MathOperation::Divide => {
            if rest.iter().any(|n| *n == 0.0) {
                return Err(ToolError::DivisionByZero);
            }
            rest.iter().fold(first, |acc, n| acc / n)
        }
    };

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operations() {
        assert_eq!(math_tool(&[1.0, 2.0, 3.0], "add"), Ok(6.0));
        assert_eq!(math_tool(&[10.0, 3.0, 2.0], "subtract"), Ok(5.0));
        assert_eq!(math_tool(&[2.0, 3.0, 4.0], "multiply"), Ok(24.0));
        assert_eq!(math_tool(&[100.0, 2.0, 5.0], "divide"), Ok(10.0));
        assert_eq!(math_tool(&[7.5], "add"), Ok(7.5));
        assert_eq!(math_tool(&[4.0], "multiply"), Ok(4.0));
    }

    #[test]
    fn test_empty_operands() {
        assert_eq!(
            math_tool(&[], "add"),
            Err(ToolError::invalid("At least one number is required."))
        );
    }

    #[test]
    fn test_insufficient_operands() {
        assert_eq!(
            math_tool(&[10.0], "subtract"),
            Err(ToolError::invalid("Subtract requires at least two numbers."))
        );
        assert_eq!(
            math_tool(&[10.0], "divide"),
            Err(ToolError::invalid("Divide requires at least two numbers."))
        );
    }

    #[test]
    fn test_division_by_zero_any_position() {
        assert_eq!(math_tool(&[100.0, 0.0], "divide"), Err(ToolError::DivisionByZero));
        assert_eq!(math_tool(&[100.0, 5.0, 0.0], "divide"), Err(ToolError::DivisionByZero));
        assert_eq!(math_tool(&[100.0, 0.0, 5.0], "divide"), Err(ToolError::DivisionByZero));
        assert_eq!(math_tool(&[0.0, 5.0], "divide"), Ok(0.0));
    }

    #[test]
    fn test_unsupported_operation() {
        assert_eq!(
            math_tool(&[1.0, 2.0], "modulo"),
            Err(ToolError::UnsupportedOperation("modulo".to_string()))
        );
    }
}
