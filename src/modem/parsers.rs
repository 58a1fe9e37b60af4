use anyhow::{anyhow, Result};

/// Parses `+CMGS: <mr>` — the message reference returned after a successful send.
pub fn parse_cmgs_result(response: &str) -> Result<u8> {
    let line = response
        .lines()
        .find(|line| line.trim().starts_with("+CMGS:"))
        .ok_or_else(|| anyhow!("No CMGS response found in buffer"))?;

    line.trim()
        .strip_prefix("+CMGS:")
        .ok_or_else(|| anyhow!("Malformed CMGS response"))?
        .trim()
        .parse()
        .map_err(|_| anyhow!("Invalid CMGS message reference number"))
}

/// Parses `+CMGW: <index>` — the storage index assigned to a stored SMS.
pub fn parse_cmgw_result(response: &str) -> Result<u32> {
    let line = response
        .lines()
        .find(|line| line.trim().starts_with("+CMGW:"))
        .ok_or_else(|| anyhow!("No CMGW response found in buffer"))?;

    line.trim()
        .strip_prefix("+CMGW:")
        .ok_or_else(|| anyhow!("Malformed CMGW response"))?
        .trim()
        .parse()
        .map_err(|_| anyhow!("Invalid CMGW storage index"))
}

/// Parses the `+CPMS: (("SM","ME",...),...)` capability list from
/// `AT+CPMS=?` into the raw storage identifiers the modem advertises for
/// the first (mem1) range, since mem1/mem2/mem3 are always reported with
/// identical option sets on every modem this crate has been tested against.
pub fn parse_cpms_capabilities(response: &str) -> Result<Vec<String>> {
    let line = response
        .lines()
        .find(|line| line.trim().starts_with("+CPMS:"))
        .ok_or_else(|| anyhow!("No CPMS response found in buffer"))?;

    let data = line
        .trim()
        .strip_prefix("+CPMS:")
        .ok_or_else(|| anyhow!("Malformed CPMS response"))?
        .trim();

    let first_group = data
        .split(')')
        .next()
        .and_then(|group| group.split('(').last())
        .ok_or_else(|| anyhow!("Malformed CPMS capability group"))?;

    Ok(first_group
        .split(',')
        .map(|s| s.trim().trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cmgs_result() {
        assert_eq!(parse_cmgs_result("+CMGS: 42\r\nOK").unwrap(), 42);
        assert!(parse_cmgs_result("OK").is_err());
    }

    #[test]
    fn test_parse_cmgw_result() {
        assert_eq!(parse_cmgw_result("+CMGW: 7\r\nOK").unwrap(), 7);
        assert!(parse_cmgw_result("ERROR").is_err());
    }

    #[test]
    fn test_parse_cpms_capabilities() {
        let response = r#"+CPMS: ("SM","ME"),("SM","ME"),("SM","ME")"#;
        let storages = parse_cpms_capabilities(response).unwrap();
        assert_eq!(storages, vec!["SM".to_string(), "ME".to_string()]);
    }

    #[test]
    fn test_parse_cpms_capabilities_missing() {
        assert!(parse_cpms_capabilities("OK").is_err());
    }
}
