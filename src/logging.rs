//! Log output with secrets masked.
//!
//! Every formatted log line passes through [`RedactionPatterns::redact`]
//! before reaching stderr, so bot tokens, the Gemini API key and R2
//! credentials never appear in logs even when echoed inside error messages.

use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "gemini_chat_bot=info,hyper=warn,reqwest=warn";

/// Compiled patterns for secrets that must not be logged
pub struct RedactionPatterns {
    bot_url_token: Regex,
    bare_token: Regex,
    bot_prefixed_token: Regex,
    api_key_param: Regex,
    r2_env: Regex,
    aws_dict: Regex,
}

impl RedactionPatterns {
    /// Compile all patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any pattern is invalid.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            bot_url_token: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            bare_token: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            bot_prefixed_token: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
            api_key_param: Regex::new(r"([?&]key=)[^\s&]+")?,
            r2_env: Regex::new(r"(R2_(?:ACCESS_KEY_ID|SECRET_ACCESS_KEY)=)[^\s&]+")?,
            aws_dict: Regex::new(r"('aws_(?:access_key_id|secret_access_key)': ')[^']*'")?,
        })
    }

    /// Replace every secret in `input` with a placeholder
    #[must_use]
    pub fn redact(&self, input: &str) -> String {
        let output = self
            .bot_url_token
            .replace_all(input, "$1[TELEGRAM_TOKEN]$3");
        let output = self.bare_token.replace_all(&output, "[TELEGRAM_TOKEN]");
        let output = self
            .bot_prefixed_token
            .replace_all(&output, "$1[TELEGRAM_TOKEN]");
        let output = self.api_key_param.replace_all(&output, "$1[MASKED]");
        let output = self.r2_env.replace_all(&output, "$1[MASKED]");
        self.aws_dict
            .replace_all(&output, "$1[MASKED]'")
            .into_owned()
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let redacted = self.patterns.redact(&String::from_utf8_lossy(buf));
        self.inner.write_all(redacted.as_bytes())?;
        // Report the input length; the redacted output may differ in size
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: (self.make_inner)(),
            patterns: self.patterns.clone(),
        }
    }
}

/// Filter directives: `RUST_LOG` if set, `debug` when `DEBUG_MODE=true`, else [`DEFAULT_FILTER`]
#[must_use]
pub fn env_filter(debug_mode: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug_mode {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new(DEFAULT_FILTER)
        }
    })
}

/// Whether `DEBUG_MODE` is set to a true value
#[must_use]
pub fn debug_mode_from_env() -> bool {
    std::env::var("DEBUG_MODE").is_ok_and(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

/// Install the global subscriber writing redacted lines to stderr
pub fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter {
        make_inner: io::stderr,
        patterns,
    };

    tracing_subscriber::registry()
        .with(env_filter(debug_mode_from_env()))
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> Result<RedactionPatterns, regex::Error> {
        RedactionPatterns::new()
    }

    #[test]
    fn test_telegram_token_in_url_is_masked() -> Result<(), regex::Error> {
        let line = "POST https://api.telegram.org/bot123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw0/sendMessage failed";
        let out = patterns()?.redact(line);
        assert!(!out.contains("AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw0"));
        assert!(out.contains("[TELEGRAM_TOKEN]"));
        Ok(())
    }

    #[test]
    fn test_gemini_key_param_is_masked() -> Result<(), regex::Error> {
        let line = "error sending request for url (https://generativelanguage.googleapis.com/v1beta/models/m:generateContent?key=AIzaSySECRET)";
        let out = patterns()?.redact(line);
        assert!(!out.contains("AIzaSySECRET"));
        assert!(out.contains("?key=[MASKED]"));
        Ok(())
    }

    #[test]
    fn test_r2_credentials_are_masked() -> Result<(), regex::Error> {
        let p = patterns()?;
        assert_eq!(
            p.redact("R2_SECRET_ACCESS_KEY=abc123 next"),
            "R2_SECRET_ACCESS_KEY=[MASKED] next"
        );
        assert_eq!(
            p.redact("{'aws_access_key_id': 'AKIA'}"),
            "{'aws_access_key_id': '[MASKED]'}"
        );
        Ok(())
    }

    #[test]
    fn test_writer_redacts_before_inner() -> Result<(), Box<dyn std::error::Error>> {
        let mut writer = RedactingWriter {
            inner: Vec::new(),
            patterns: Arc::new(patterns()?),
        };
        let input = b"url ?key=secret done";
        assert_eq!(writer.write(input)?, input.len());
        assert_eq!(String::from_utf8(writer.inner)?, "url ?key=[MASKED] done");
        Ok(())
    }
}
