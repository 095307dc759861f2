use std::borrow::Cow;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Configuration(Cow<'static, str>),

    #[error("couldn't connect to charging station at {host}:{port}")]
    Connection {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("transport failure on register {register}")]
    Transport {
        register: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("{parameter} value '{value}' out of range ({reason})")]
    ParameterOutOfRange {
        parameter: &'static str,
        value: u32,
        reason: &'static str,
    },
}

impl Error {
    pub(crate) fn transport(register: u16) -> impl FnOnce(std::io::Error) -> Self {
        move |source| Self::Transport { register, source }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Self::Configuration(s.into())
    }
}
impl From<&'static str> for Error {
    fn from(s: &'static str) -> Self {
        Self::Configuration(s.into())
    }
}

#[test]
fn parameter_error_names_the_bound() {
    let err = Error::ParameterOutOfRange {
        parameter: "current",
        value: 5,
        reason: "must be greater than 6 and less than 63",
    };
    assert_eq!(
        err.to_string(),
        "current value '5' out of range (must be greater than 6 and less than 63)"
    );
}

#[test]
fn plain_strings_are_configuration_errors() {
    let err: Error = "'host' not given".into();
    assert!(matches!(err, Error::Configuration(ref msg) if msg == "'host' not given"));
}
