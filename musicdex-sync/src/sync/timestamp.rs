use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub fn now_millis() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    (nanos / 1_000_000) as i64
}

/// Parses a server RFC 3339 timestamp into unix milliseconds.
pub fn parse_rfc3339_millis(value: &str) -> Result<i64, time::error::Parse> {
    let parsed = OffsetDateTime::parse(value, &Rfc3339)?;
    Ok((parsed.unix_timestamp_nanos() / 1_000_000) as i64)
}

pub fn parse_optional(value: Option<&str>) -> Result<Option<i64>, time::error::Parse> {
    value.map(parse_rfc3339_millis).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fractional_utc_timestamp() {
        assert_eq!(
            parse_rfc3339_millis("2024-01-01T00:00:00.250Z").unwrap(),
            1_704_067_200_250
        );
    }

    #[test]
    fn parses_offsets() {
        assert_eq!(
            parse_rfc3339_millis("2024-01-01T01:00:00+01:00").unwrap(),
            1_704_067_200_000
        );
    }

    #[test]
    fn missing_value_is_none() {
        assert_eq!(parse_optional(None).unwrap(), None);
        assert!(parse_optional(Some("yesterday")).is_err());
    }
}
