use crate::cli::errors::{CliError, CliResult};

/// Validates the fusion weight. Out-of-range values are clamped by the engine.
pub fn validate_alpha(alpha: f32) -> CliResult<()> {
    if alpha.is_nan() {
        return Err(CliError::validation("alpha", "Alpha must be a number"));
    }
    Ok(())
}

/// Validates the MMR trade-off. Out-of-range values are clamped by the engine.
pub fn validate_diversity(diversity: f32) -> CliResult<()> {
    if !diversity.is_finite() {
        return Err(CliError::validation("diversity", "Diversity must be a finite number"));
    }
    Ok(())
}

/// Validates the result count
pub fn validate_k(k: usize) -> CliResult<()> {
    if k == 0 {
        return Err(CliError::validation("k", "At least one result must be requested"));
    }
    if k > 1000 {
        return Err(CliError::validation("k", "Cannot request more than 1000 results"));
    }
    Ok(())
}

/// Validates a price range
pub fn validate_price_range(min: Option<f64>, max: Option<f64>) -> CliResult<()> {
    for (field, value) in [("min_price", min), ("max_price", max)] {
        if let Some(value) = value {
            if !value.is_finite() || value < 0.0 {
                return Err(CliError::validation(field, "Price must be a non-negative number"));
            }
        }
    }
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(CliError::validation("min_price", "Minimum price exceeds maximum price"));
        }
    }
    Ok(())
}

/// Validates that a query has at least one input
pub fn validate_query_input(has_text: bool, has_image: bool) -> CliResult<()> {
    if !has_text && !has_image {
        return Err(CliError::invalid_input(
            "Provide --text, --image, --text-embedding or --image-embedding",
        ));
    }
    Ok(())
}

/// Parses a JSON array of floats
pub fn parse_embedding(data: &[u8]) -> CliResult<Vec<f32>> {
    let values: Vec<f32> = serde_json::from_slice(data)?;
    if values.is_empty() {
        return Err(CliError::invalid_input("Embedding file holds an empty array"));
    }
    Ok(values)
}

/// Validates product ids given on the command line
pub fn validate_ids(ids: &[String]) -> CliResult<()> {
    if let Some(empty) = ids.iter().position(|id| id.trim().is_empty()) {
        return Err(CliError::validation("ids", format!("Id #{} is empty", empty + 1)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_alpha() {
        assert!(validate_alpha(0.0).is_ok());
        assert!(validate_alpha(1.0).is_ok());
        assert!(validate_alpha(1.1).is_ok());
        assert!(validate_alpha(-0.5).is_ok());
        assert!(validate_alpha(f32::NAN).is_err());
    }

    #[test]
    fn test_validate_diversity() {
        assert!(validate_diversity(0.7).is_ok());
        assert!(validate_diversity(1.5).is_ok());
        assert!(validate_diversity(f32::INFINITY).is_err());
    }

    #[test]
    fn test_validate_k() {
        assert!(validate_k(10).is_ok());
        assert!(validate_k(0).is_err());
        assert!(validate_k(5000).is_err());
    }

    #[test]
    fn test_validate_price_range() {
        assert!(validate_price_range(None, None).is_ok());
        assert!(validate_price_range(Some(10.0), Some(20.0)).is_ok());
        assert!(validate_price_range(Some(30.0), Some(20.0)).is_err());
        assert!(validate_price_range(Some(-1.0), None).is_err());
    }

    #[test]
    fn test_parse_embedding() {
        assert_eq!(parse_embedding(b"[0.5, 1]").unwrap(), vec![0.5, 1.0]);
        assert!(parse_embedding(b"[]").is_err());
        assert!(parse_embedding(b"{\"a\": 1}").is_err());
    }

    #[test]
    fn test_validate_query_input_and_ids() {
        assert!(validate_query_input(false, false).is_err());
        assert!(validate_query_input(true, false).is_ok());
        assert!(validate_ids(&["a".to_string(), " ".to_string()]).is_err());
        assert!(validate_ids(&["a".to_string()]).is_ok());
    }
}
