//! FTP reply parsing
//!
//! Replies are either a single line (`226 Transfer complete`) or a multi-line
//! block opened by `ddd-` and closed by the first line starting with the same
//! code followed by a space:
//!
//! ```text
//! 220-FEMC FTP server
//! 220-firmware 3.x
//! 220 ready
//! ```

use std::fmt;

use crate::error::{FtpError, Result};

/// Reply class, taken from the first digit of the reply code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    /// 1xx: action started, expect another reply
    PositivePreliminary,
    /// 2xx: action completed
    PositiveCompletion,
    /// 3xx: more information needed (e.g. password after USER)
    PositiveIntermediate,
    /// 4xx: transient failure
    TransientNegative,
    /// 5xx: permanent failure
    PermanentNegative,
}

/// A complete FTP reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpReply {
    /// Three-digit reply code
    pub code: u16,
    /// Reply text lines, with the status prefix removed from the first and last line
    pub lines: Vec<String>,
}

impl FtpReply {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![text.into()],
        }
    }

    pub fn class(&self) -> ReplyClass {
        match self.code / 100 {
            1 => ReplyClass::PositivePreliminary,
            2 => ReplyClass::PositiveCompletion,
            3 => ReplyClass::PositiveIntermediate,
            4 => ReplyClass::TransientNegative,
            _ => ReplyClass::PermanentNegative,
        }
    }

    pub fn is_preliminary(&self) -> bool {
        self.class() == ReplyClass::PositivePreliminary
    }

    pub fn is_completion(&self) -> bool {
        self.class() == ReplyClass::PositiveCompletion
    }

    pub fn is_intermediate(&self) -> bool {
        self.class() == ReplyClass::PositiveIntermediate
    }

    pub fn is_negative(&self) -> bool {
        matches!(
            self.class(),
            ReplyClass::TransientNegative | ReplyClass::PermanentNegative
        )
    }

    /// Reply text joined with spaces
    pub fn text(&self) -> String {
        self.lines.join(" ")
    }
}

impl fmt::Display for FtpReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.text())
    }
}

/// Split `ddd<sep>text` into its parts
///
/// `sep` is `None` for a bare code with nothing after it.
fn split_status(line: &str) -> Option<(u16, Option<char>, &str)> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return None;
    }
    if !(b'1'..=b'5').contains(&bytes[0]) {
        return None;
    }
    let code: u16 = line[..3].parse().ok()?;

    match bytes.get(3) {
        None => Some((code, None, "")),
        Some(b' ') => Some((code, Some(' '), &line[4..])),
        Some(b'-') => Some((code, Some('-'), &line[4..])),
        Some(_) => None,
    }
}

/// Incremental reply parser fed one control-channel line at a time
#[derive(Debug)]
pub struct ReplyParser {
    pending: Option<(u16, Vec<String>)>,
    max_lines: usize,
}

impl ReplyParser {
    pub fn new(max_lines: usize) -> Self {
        Self {
            pending: None,
            max_lines,
        }
    }

    /// Feed one line (terminator optional)
    ///
    /// Returns the reply once its final line has been seen.
    pub fn feed(&mut self, line: &str) -> Result<Option<FtpReply>> {
        let line = line.trim_end_matches(['\r', '\n']);

        let Some((code, mut lines)) = self.pending.take() else {
            return match split_status(line) {
                Some((code, Some('-'), text)) => {
                    self.pending = Some((code, vec![text.to_string()]));
                    Ok(None)
                }
                Some((code, _, text)) => Ok(Some(FtpReply {
                    code,
                    lines: vec![text.to_string()],
                })),
                None => Err(FtpError::InvalidReply(line.to_string())),
            };
        };

        match split_status(line) {
            Some((end, Some(' ') | None, text)) if end == code => {
                lines.push(text.to_string());
                Ok(Some(FtpReply { code, lines }))
            }
            _ => {
                if lines.len() >= self.max_lines {
                    return Err(FtpError::InvalidReply(format!(
                        "reply {} exceeds {} lines",
                        code, self.max_lines
                    )));
                }
                lines.push(line.to_string());
                self.pending = Some((code, lines));
                Ok(None)
            }
        }
    }
}

/// Extract the data port from a `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)` reply
///
/// The advertised host is ignored; servers behind NAT routinely report an
/// unreachable address, so callers connect to the control connection's peer.
pub fn parse_passive_port(reply: &FtpReply) -> Result<u16> {
    if reply.code != 227 {
        return Err(FtpError::PassiveMode(format!("unexpected reply {}", reply)));
    }

    let text = reply.text();
    text.split(|c: char| !(c.is_ascii_digit() || c == ','))
        .filter_map(|token| {
            let fields: Vec<u8> = token
                .split(',')
                .map(str::parse)
                .collect::<std::result::Result<_, _>>()
                .ok()?;
            (fields.len() == 6).then(|| (u16::from(fields[4]) << 8) | u16::from(fields[5]))
        })
        .next()
        .ok_or_else(|| FtpError::PassiveMode(format!("no address in reply {}", reply)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_all(lines: &[&str]) -> Result<Option<FtpReply>> {
        let mut parser = ReplyParser::new(8);
        let mut last = None;
        for line in lines {
            last = parser.feed(line)?;
        }
        Ok(last)
    }

    #[test]
    fn test_single_line_reply() {
        let reply = parse_all(&["220 FEMC ready\r\n"]).unwrap().unwrap();
        assert_eq!(reply.code, 220);
        assert_eq!(reply.lines, vec!["FEMC ready".to_string()]);
        assert!(reply.is_completion());
    }

    #[test]
    fn test_bare_code_reply() {
        let reply = parse_all(&["200"]).unwrap().unwrap();
        assert_eq!(reply.code, 200);
        assert_eq!(reply.text(), "");
    }

    #[test]
    fn test_multi_line_reply() {
        let reply = parse_all(&[
            "220-FEMC FTP server",
            " firmware 3.x",
            "220-still going",
            "220 ready",
        ])
        .unwrap()
        .unwrap();
        assert_eq!(reply.code, 220);
        assert_eq!(
            reply.lines,
            vec![
                "FEMC FTP server".to_string(),
                " firmware 3.x".to_string(),
                "220-still going".to_string(),
                "ready".to_string(),
            ]
        );
    }

    #[test]
    fn test_multi_line_incomplete() {
        assert_eq!(parse_all(&["211-Features:", " PASV"]).unwrap(), None);
    }

    #[test]
    fn test_multi_line_limit() {
        let mut parser = ReplyParser::new(2);
        parser.feed("211-a").unwrap();
        parser.feed("b").unwrap();
        assert!(matches!(parser.feed("c"), Err(FtpError::InvalidReply(_))));
    }

    #[test]
    fn test_garbage_is_invalid() {
        assert!(matches!(
            parse_all(&["hello"]),
            Err(FtpError::InvalidReply(_))
        ));
        assert!(matches!(
            parse_all(&["999 nope"]),
            Err(FtpError::InvalidReply(_))
        ));
        assert!(matches!(
            parse_all(&["220x"]),
            Err(FtpError::InvalidReply(_))
        ));
    }

    #[test]
    fn test_reply_classes() {
        assert_eq!(FtpReply::new(150, "").class(), ReplyClass::PositivePreliminary);
        assert_eq!(FtpReply::new(331, "").class(), ReplyClass::PositiveIntermediate);
        assert_eq!(FtpReply::new(425, "").class(), ReplyClass::TransientNegative);
        assert_eq!(FtpReply::new(550, "").class(), ReplyClass::PermanentNegative);
        assert!(FtpReply::new(452, "").is_negative());
        assert!(!FtpReply::new(226, "").is_negative());
    }

    #[test]
    fn test_passive_port() {
        let reply = FtpReply::new(227, "Entering Passive Mode (192,168,1,20,19,137).");
        assert_eq!(parse_passive_port(&reply).unwrap(), 19 * 256 + 137);
    }

    #[test]
    fn test_passive_port_without_parentheses() {
        let reply = FtpReply::new(227, "Entering Passive Mode 10,0,0,5,4,1");
        assert_eq!(parse_passive_port(&reply).unwrap(), 1025);
    }

    #[test]
    fn test_passive_port_rejects_wrong_reply() {
        assert!(matches!(
            parse_passive_port(&FtpReply::new(200, "(1,2,3,4,5,6)")),
            Err(FtpError::PassiveMode(_))
        ));
        assert!(matches!(
            parse_passive_port(&FtpReply::new(227, "Entering Passive Mode (1,2,3)")),
            Err(FtpError::PassiveMode(_))
        ));
        assert!(matches!(
            parse_passive_port(&FtpReply::new(227, "(1,2,3,4,300,6)")),
            Err(FtpError::PassiveMode(_))
        ));
    }
}
