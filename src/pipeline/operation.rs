use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Width used by `thumbnail` and by a bare `resize` token.
pub const THUMBNAIL_WIDTH: u32 = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    FlipHorizontal,
    FlipVertical,
    RotateRight,
    RotateLeft,
    Grayscale,
    Thumbnail,
    /// `None` on either side means "derive from the aspect ratio".
    Resize {
        width: Option<u32>,
        height: Option<u32>,
    },
    /// Counter-clockwise rotation.
    RotateByAngle {
        degrees: f64,
    },
    Unknown(String),
}

impl Operation {
    pub fn name(&self) -> &str {
        match self {
            Self::FlipHorizontal => "flipHorizontal",
            Self::FlipVertical => "flipVertical",
            Self::RotateRight => "rotateRight",
            Self::RotateLeft => "rotateLeft",
            Self::Grayscale => "grayscale",
            Self::Thumbnail => "thumbnail",
            Self::Resize { .. } => "resize",
            Self::RotateByAngle { .. } => "rotate",
            Self::Unknown(token) => token.as_str(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resize { width, height } => write!(
                f,
                "resize,{},{}",
                width.unwrap_or(0),
                height.unwrap_or(0)
            ),
            Self::RotateByAngle { degrees } => write!(f, "rotate,{degrees}"),
            other => f.write_str(other.name()),
        }
    }
}

/// How numeric token parameters that fail to parse are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamPolicy {
    /// Unparsable numbers silently become 0.
    #[default]
    Lenient,
    /// Unparsable numbers reject the token.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("operation '{token}' has invalid numeric parameter '{value}'")]
    InvalidParameter { token: String, value: String },
}

/// Resolves a token with the lenient policy. Never fails.
pub fn resolve(token: &str) -> Operation {
    let mut params = ParamReader::new(token, ParamPolicy::Lenient);
    let operation = resolve_with(token, &mut params);
    debug_assert!(params.error.is_none());
    operation
}

pub fn resolve_with_policy(token: &str, policy: ParamPolicy) -> Result<Operation, ResolveError> {
    let mut params = ParamReader::new(token, policy);
    let operation = resolve_with(token, &mut params);
    match params.error {
        Some(error) => Err(error),
        None => Ok(operation),
    }
}

pub fn resolve_all<S>(tokens: &[S], policy: ParamPolicy) -> Result<Vec<Operation>, ResolveError>
where
    S: AsRef<str>,
{
    tokens
        .iter()
        .map(|token| resolve_with_policy(token.as_ref(), policy))
        .collect()
}

fn resolve_with(token: &str, params: &mut ParamReader<'_>) -> Operation {
    match token {
        "flipVertical" => return Operation::FlipVertical,
        "flipHorizontal" => return Operation::FlipHorizontal,
        "rotateRight" => return Operation::RotateRight,
        "rotateLeft" => return Operation::RotateLeft,
        "grayscale" => return Operation::Grayscale,
        "thumbnail" => return Operation::Thumbnail,
        _ => {}
    }

    let parts = token.split(',').collect::<Vec<_>>();
    if token.starts_with("resize") {
        return match parts.len() {
            1 => Operation::Resize {
                width: Some(THUMBNAIL_WIDTH),
                height: None,
            },
            2 => Operation::Resize {
                width: non_zero(params.number::<u32>(parts[1])),
                height: None,
            },
            _ => Operation::Resize {
                width: non_zero(params.number::<u32>(parts[1])),
                height: non_zero(params.number::<u32>(parts[2])),
            },
        };
    }
    if token.starts_with("rotate") {
        return match parts.len() {
            1 => Operation::RotateRight,
            _ => Operation::RotateByAngle {
                degrees: params.number::<f64>(parts[1]),
            },
        };
    }

    Operation::Unknown(token.to_string())
}

fn non_zero(value: u32) -> Option<u32> {
    (value > 0).then_some(value)
}

struct ParamReader<'a> {
    token: &'a str,
    policy: ParamPolicy,
    error: Option<ResolveError>,
}

impl<'a> ParamReader<'a> {
    fn new(token: &'a str, policy: ParamPolicy) -> Self {
        Self {
            token,
            policy,
            error: None,
        }
    }

    fn number<T>(&mut self, raw: &str) -> T
    where
        T: FromStr + Default,
    {
        match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                if self.policy == ParamPolicy::Strict && self.error.is_none() {
                    self.error = Some(ResolveError::InvalidParameter {
                        token: self.token.to_string(),
                        value: raw.to_string(),
                    });
                }
                T::default()
            }
        }
    }
}
