//! Boot options for the virtual-memory subsystem.
//!
//! Options come from the kernel command line, e.g. `-ul=256 -stack=4M -placement=first`.
//! Anything that is not one of ours is skipped so the line can be shared with other
//! subsystems.

use core::fmt;
use nom::bytes::complete::{take_till, take_while1};
use nom::character::complete::{char, digit1, one_of};
use nom::combinator::{all_consuming, map_res, opt};
use nom::sequence::preceded;
use nom::IResult;
use pager_shared::mem::{DEFAULT_MAX_STACK_SIZE, PAGE_FRAME_SIZE, PHYS_BASE};
use pager_shared::sizes::{KB, MB};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    #[default]
    NextFit,
    FirstFit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Cap on the number of frames in the user pool (`-ul=N`).
    pub user_pool_limit: Option<usize>,
    /// Lowest address stack growth may reach is `PHYS_BASE - max_stack` (`-stack=SIZE`).
    pub max_stack: usize,
    pub placement: Placement,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            user_pool_limit: None,
            max_stack: DEFAULT_MAX_STACK_SIZE,
            placement: Placement::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The value of the named option could not be parsed.
    InvalidValue(&'static str),
    /// `-ul=0` leaves no frames for user pages.
    EmptyPool,
    /// The stack limit is smaller than a page or reaches into kernel space.
    StackOutOfRange(usize),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue(option) => write!(f, "invalid value for -{option}"),
            ConfigError::EmptyPool => write!(f, "user pool limit must be at least one frame"),
            ConfigError::StackOutOfRange(size) => write!(f, "stack limit {size:#x} out of range"),
        }
    }
}

impl core::error::Error for ConfigError {}

/// `-name` or `-name=value`.
fn option(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    let (input, _) = char('-')(input)?;
    let (input, name) = take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)?;
    let (input, value) = opt(preceded(char('='), take_till(char::is_whitespace)))(input)?;
    Ok((input, (name, value)))
}

fn count(input: &str) -> IResult<&str, usize> {
    map_res(digit1, |digits: &str| digits.parse::<usize>())(input)
}

/// Decimal byte count with an optional `K` or `M` suffix.
fn size(input: &str) -> IResult<&str, Option<usize>> {
    let (input, value) = count(input)?;
    let (input, unit) = opt(one_of("KkMm"))(input)?;
    let scale = match unit {
        Some('K' | 'k') => KB,
        Some(_) => MB,
        None => 1,
    };
    Ok((input, value.checked_mul(scale)))
}

fn parse_value<'a, T>(
    name: &'static str,
    value: Option<&'a str>,
    parser: impl FnMut(&'a str) -> IResult<&'a str, T>,
) -> Result<T, ConfigError> {
    let value = value.ok_or(ConfigError::InvalidValue(name))?;
    all_consuming(parser)(value)
        .map(|(_, parsed)| parsed)
        .map_err(|_| ConfigError::InvalidValue(name))
}

impl VmConfig {
    pub fn parse(cmdline: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for word in cmdline.split_whitespace() {
            let Ok(("", (name, value))) = option(word) else {
                continue;
            };
            match name {
                "ul" => {
                    let limit = parse_value("ul", value, count)?;
                    if limit == 0 {
                        return Err(ConfigError::EmptyPool);
                    }
                    config.user_pool_limit = Some(limit);
                }
                "stack" => {
                    let max_stack = parse_value("stack", value, size)?
                        .ok_or(ConfigError::InvalidValue("stack"))?;
                    if max_stack < PAGE_FRAME_SIZE || max_stack >= PHYS_BASE {
                        return Err(ConfigError::StackOutOfRange(max_stack));
                    }
                    config.max_stack = max_stack;
                }
                "placement" => {
                    config.placement = match value {
                        Some("next") => Placement::NextFit,
                        Some("first") => Placement::FirstFit,
                        _ => return Err(ConfigError::InvalidValue("placement")),
                    };
                }
                _ => {}
            }
        }

        Ok(config)
    }

    /// Frames the user pool gets out of `available`.
    pub fn user_pool_frames(&self, available: usize) -> usize {
        self.user_pool_limit
            .map_or(available, |limit| limit.min(available))
    }
}
