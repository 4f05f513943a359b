use serde::{Deserialize, Serialize};

/// Content of one cell as the change log sees it: a literal or formula
/// source text. Evaluated results are the document's business.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    /// Formula source including the leading `=`.
    Formula(String),
}

impl CellValue {
    pub fn from_input(input: &str) -> Self {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return CellValue::Empty;
        }

        if trimmed.starts_with('=') {
            return CellValue::Formula(trimmed.to_string());
        }

        if let Ok(num) = trimmed.parse::<f64>() {
            return CellValue::Number(num);
        }

        CellValue::Text(trimmed.to_string())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, CellValue::Formula(_))
    }

    /// Text as typed by the user.
    pub fn raw_display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Formula(source) => source.clone(),
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw_display())
    }
}

impl From<&str> for CellValue {
    fn from(input: &str) -> Self {
        CellValue::from_input(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_input() {
        assert_eq!(CellValue::from_input("  "), CellValue::Empty);
        assert_eq!(CellValue::from_input("42"), CellValue::Number(42.0));
        assert_eq!(CellValue::from_input("=A1+1"), CellValue::Formula("=A1+1".into()));
        assert_eq!(CellValue::from_input("hello"), CellValue::Text("hello".into()));
    }

    #[test]
    fn test_raw_display() {
        assert_eq!(CellValue::Number(3.0).raw_display(), "3");
        assert_eq!(CellValue::Number(2.5).raw_display(), "2.5");
        assert_eq!(CellValue::Empty.to_string(), "");
    }
}
