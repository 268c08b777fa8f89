//! Provider return codes and the response body grammar.
//!
//! Responses are a status token optionally followed by a single space and the
//! IP address the provider now has on record, e.g. `good 203.0.113.5`.
//! See <https://help.dyn.com/remote-access-api/return-codes/>.

use crate::error::ProtocolError;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Every status token the provider is known to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// The update was applied.
    Good,
    /// The hostname already pointed at the address.
    NoChange,
    /// The hostname is not a fully-qualified domain name.
    NotFqdn,
    /// The hostname does not exist in this account.
    NoHost,
    /// Too many hosts in one update.
    NumHost,
    /// The hostname is blocked for update abuse.
    Abuse,
    /// The credentials do not match.
    BadAuth,
    /// User agent missing or HTTP method not permitted.
    BadAgent,
    /// DNS error on the provider side.
    DnsErr,
    /// Provider-side problem or scheduled maintenance (`911`).
    Emergency,
    /// Updates are arriving too quickly.
    Interval,
}

/// How a status token must be acted upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    /// Permanent and caused by the caller; stop updating.
    ClientFailure,
    /// Transient and caused by the provider; back off, then resume.
    ServerFailure,
}

impl StatusCode {
    pub const ALL: [StatusCode; 11] = [
        StatusCode::Good,
        StatusCode::NoChange,
        StatusCode::NotFqdn,
        StatusCode::NoHost,
        StatusCode::NumHost,
        StatusCode::Abuse,
        StatusCode::BadAuth,
        StatusCode::BadAgent,
        StatusCode::DnsErr,
        StatusCode::Emergency,
        StatusCode::Interval,
    ];

    /// The wire token.
    pub fn as_str(self) -> &'static str {
        match self {
            StatusCode::Good => "good",
            StatusCode::NoChange => "nochg",
            StatusCode::NotFqdn => "notfqdn",
            StatusCode::NoHost => "nohost",
            StatusCode::NumHost => "numhost",
            StatusCode::Abuse => "abuse",
            StatusCode::BadAuth => "badauth",
            StatusCode::BadAgent => "badagent",
            StatusCode::DnsErr => "dnserr",
            StatusCode::Emergency => "911",
            StatusCode::Interval => "interval",
        }
    }

    pub fn class(self) -> StatusClass {
        match self {
            StatusCode::Good | StatusCode::NoChange => StatusClass::Success,
            StatusCode::NotFqdn
            | StatusCode::NoHost
            | StatusCode::NumHost
            | StatusCode::Abuse
            | StatusCode::BadAuth
            | StatusCode::BadAgent => StatusClass::ClientFailure,
            StatusCode::DnsErr | StatusCode::Emergency | StatusCode::Interval => {
                StatusClass::ServerFailure
            }
        }
    }
}

impl FromStr for StatusCode {
    type Err = ProtocolError;

    fn from_str(token: &str) -> std::result::Result<Self, Self::Err> {
        StatusCode::ALL
            .into_iter()
            .find(|code| code.as_str() == token)
            .ok_or_else(|| ProtocolError::UnknownStatus(token.to_string()))
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The classified result of one update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The provider now points the hostname at this address.
    Good(IpAddr),
    /// The provider already had this address.
    NoChange(IpAddr),
    ClientFailure(StatusCode),
    ServerFailure(StatusCode),
}

impl UpdateOutcome {
    pub fn status(&self) -> StatusCode {
        match self {
            UpdateOutcome::Good(_) => StatusCode::Good,
            UpdateOutcome::NoChange(_) => StatusCode::NoChange,
            UpdateOutcome::ClientFailure(status) | UpdateOutcome::ServerFailure(status) => *status,
        }
    }

    /// The address the provider confirmed, for successful outcomes.
    pub fn confirmed_ip(&self) -> Option<IpAddr> {
        match self {
            UpdateOutcome::Good(ip) | UpdateOutcome::NoChange(ip) => Some(*ip),
            UpdateOutcome::ClientFailure(_) | UpdateOutcome::ServerFailure(_) => None,
        }
    }
}

/// Parse a `2xx` response body into an outcome.
pub fn parse_body(body: &str) -> std::result::Result<UpdateOutcome, ProtocolError> {
    let body = body.trim();
    let (token, rest) = match body.split_once(' ') {
        Some((token, rest)) => (token, Some(rest.trim())),
        None => (body, None),
    };

    let status: StatusCode = token.parse()?;

    match status.class() {
        StatusClass::Success => {
            let value = rest
                .filter(|r| !r.is_empty())
                .ok_or(ProtocolError::MissingIp(status))?;
            let ip = value.parse().map_err(|_| ProtocolError::InvalidIp {
                status,
                value: value.to_string(),
            })?;

            if status == StatusCode::Good {
                Ok(UpdateOutcome::Good(ip))
            } else {
                Ok(UpdateOutcome::NoChange(ip))
            }
        }
        StatusClass::ClientFailure => Ok(UpdateOutcome::ClientFailure(status)),
        StatusClass::ServerFailure => Ok(UpdateOutcome::ServerFailure(status)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_table() {
        let expected = [
            ("good", StatusClass::Success),
            ("nochg", StatusClass::Success),
            ("notfqdn", StatusClass::ClientFailure),
            ("nohost", StatusClass::ClientFailure),
            ("numhost", StatusClass::ClientFailure),
            ("abuse", StatusClass::ClientFailure),
            ("badauth", StatusClass::ClientFailure),
            ("badagent", StatusClass::ClientFailure),
            ("dnserr", StatusClass::ServerFailure),
            ("911", StatusClass::ServerFailure),
            ("interval", StatusClass::ServerFailure),
        ];

        assert_eq!(expected.len(), StatusCode::ALL.len());
        for (token, class) in expected {
            let code: StatusCode = token.parse().unwrap();
            assert_eq!(code.class(), class, "token {token}");
            assert_eq!(code.as_str(), token);
        }
    }

    #[test]
    fn test_unknown_tokens_are_errors() {
        for token in ["", "ok", "GOOD", "badsys", "!yours"] {
            assert_eq!(
                token.parse::<StatusCode>(),
                Err(ProtocolError::UnknownStatus(token.to_string()))
            );
        }
    }

    #[test]
    fn test_parse_good() {
        let outcome = parse_body("good 203.0.113.5\n").unwrap();
        assert_eq!(outcome, UpdateOutcome::Good("203.0.113.5".parse().unwrap()));
        assert_eq!(outcome.status(), StatusCode::Good);
    }

    #[test]
    fn test_parse_nochg_ipv6() {
        let outcome = parse_body("nochg 2001:db8::1").unwrap();
        assert_eq!(outcome, UpdateOutcome::NoChange("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_parse_success_without_ip_is_malformed() {
        assert_eq!(
            parse_body("good"),
            Err(ProtocolError::MissingIp(StatusCode::Good))
        );
        assert_eq!(
            parse_body("nochg "),
            Err(ProtocolError::MissingIp(StatusCode::NoChange))
        );
    }

    #[test]
    fn test_parse_success_with_garbage_ip() {
        assert_eq!(
            parse_body("good not-an-ip"),
            Err(ProtocolError::InvalidIp {
                status: StatusCode::Good,
                value: "not-an-ip".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_failures_ignore_trailing_text() {
        assert_eq!(
            parse_body("badauth"),
            Ok(UpdateOutcome::ClientFailure(StatusCode::BadAuth))
        );
        assert_eq!(
            parse_body("911 maintenance"),
            Ok(UpdateOutcome::ServerFailure(StatusCode::Emergency))
        );
    }

    #[test]
    fn test_parse_unknown_status() {
        assert_eq!(
            parse_body("whatever 203.0.113.5"),
            Err(ProtocolError::UnknownStatus("whatever".to_string()))
        );
    }
}
