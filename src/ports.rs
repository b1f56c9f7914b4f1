use crate::error::ConfigError;

/// Ports scanned when no `--ports` is given.
pub const DEFAULT_PORT_SPEC: &str =
    "20-22,25,42,53,80,123,143,389,443,993,995,3306,4040,4041,4443,5900-5906,7077,8080,8081,18040";

/// Parse a port specification such as `20-22,25,80` into a list of TCP ports.
///
/// Tokens are separated by commas. Each token is a single port or an inclusive
/// `start-end` range. Output keeps token order and expands ranges in place; it is
/// neither sorted nor deduplicated, so `80,80` yields two entries.
///
/// Any unparseable token, out-of-range port (valid ports are 1..=65535) or range
/// with `start > end` is an error naming the token.
pub fn parse_port_spec(spec: &str) -> Result<Vec<u16>, ConfigError> {
    let mut out: Vec<u16> = Vec::new();

    for raw in spec.split(',') {
        let token = raw.trim();

        if let Some((a, b)) = token.split_once('-') {
            let start = parse_port_str(token, a.trim())?;
            let end = parse_port_str(token, b.trim())?;
            if start > end {
                return Err(ConfigError::InvertedRange {
                    token: token.to_string(),
                    start: start.into(),
                    end: end.into(),
                });
            }
            out.extend(start..=end);
            continue;
        }

        out.push(parse_port_str(token, token)?);
    }

    Ok(out)
}

fn parse_port_str(token: &str, s: &str) -> Result<u16, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidPortToken {
        token: token.to_string(),
        reason,
    };
    if s.is_empty() {
        return Err(invalid("missing port number".into()));
    }
    let val: u32 = s.parse::<u32>().map_err(|e| invalid(format!("{s:?}: {e}")))?;
    if val == 0 || val > 65535 {
        return Err(invalid(format!("port out of range: {val}")));
    }
    Ok(val as u16)
}
