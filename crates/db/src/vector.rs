//! Text representation of pgvector values.
//!
//! The repositories run runtime queries and bind vectors as text with a
//! `::vector` cast, so the literal format has to match pgvector exactly:
//! `[v1,v2,...]` with no spaces.

/// Render an embedding as a pgvector literal.
pub fn vector_literal(values: &[f32]) -> String {
    let mut out = String::with_capacity(values.len() * 12 + 2);
    out.push('[');
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        // pgvector accepts any float syntax Rust produces, including
        // scientific notation for very small magnitudes.
        out.push_str(&format!("{v}"));
    }
    out.push(']');
    out
}

/// Parse a pgvector text value back into an f32 vector.
///
/// Returns `None` on malformed input rather than erroring, callers treat
/// an unparsable stored vector the same as an absent one.
pub fn parse_vector(text: &str) -> Option<Vec<f32>> {
    let inner = text.trim().strip_prefix('[')?.strip_suffix(']')?;
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }
    inner
        .split(',')
        .map(|part| part.trim().parse::<f32>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_has_no_spaces() {
        let lit = vector_literal(&[1.0, -0.5, 0.25]);
        assert_eq!(lit, "[1,-0.5,0.25]");
    }

    #[test]
    fn parse_round_trips_literal() {
        let values = vec![0.1_f32, -2.75, 1e-7, 42.0];
        let parsed = parse_vector(&vector_literal(&values)).unwrap();
        assert_eq!(parsed, values);
    }

    #[test]
    fn parse_accepts_spaces_after_commas() {
        let parsed = parse_vector("[1.0, 2.0, 3.0]").unwrap();
        assert_eq!(parsed, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert!(parse_vector("1,2,3").is_none());
        assert!(parse_vector("[1,,3]").is_none());
        assert!(parse_vector("[1 2 3]").is_none());
    }

    #[test]
    fn empty_vector_round_trips() {
        assert_eq!(parse_vector("[]").unwrap(), Vec::<f32>::new());
    }
}
