//! Content fields that a caller may allow to be overwritten on upsert conflict

use std::fmt;
use std::str::FromStr;

/// A content field of a stored message
///
/// On conflict these are preserved from the existing row unless named in a
/// [`ClobberSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentField {
    ThreadId,
    Sender,
    Recipients,
    Subject,
    Body,
    Size,
    Timestamp,
    IsOutgoing,
}

impl ContentField {
    pub const ALL: [ContentField; 8] = [
        ContentField::ThreadId,
        ContentField::Sender,
        ContentField::Recipients,
        ContentField::Subject,
        ContentField::Body,
        ContentField::Size,
        ContentField::Timestamp,
        ContentField::IsOutgoing,
    ];

    /// Field name, also the column name in the messages table
    pub fn name(self) -> &'static str {
        match self {
            ContentField::ThreadId => "thread_id",
            ContentField::Sender => "sender",
            ContentField::Recipients => "recipients",
            ContentField::Subject => "subject",
            ContentField::Body => "body",
            ContentField::Size => "size",
            ContentField::Timestamp => "timestamp",
            ContentField::IsOutgoing => "is_outgoing",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for ContentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for a field name that is not a clobberable content field
#[derive(Debug, thiserror::Error)]
#[error(
    "unknown clobber field '{0}' (expected one of: thread_id, sender, recipients, \
     subject, body, size, timestamp, is_outgoing)"
)]
pub struct UnknownFieldError(pub String);

impl FromStr for ContentField {
    type Err = UnknownFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentField::ALL
            .into_iter()
            .find(|field| field.name() == s.trim())
            .ok_or_else(|| UnknownFieldError(s.to_string()))
    }
}

/// Immutable set of content fields to overwrite on conflict
///
/// The default is empty: every content field keeps its stored value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClobberSet(u8);

impl ClobberSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every content field
    pub fn all() -> Self {
        ContentField::ALL.into_iter().collect()
    }

    /// A copy of this set that also contains `field`
    pub fn with(self, field: ContentField) -> Self {
        Self(self.0 | field.bit())
    }

    pub fn contains(&self, field: ContentField) -> bool {
        self.0 & field.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Fields in the set, in declaration order
    pub fn iter(&self) -> impl Iterator<Item = ContentField> + '_ {
        ContentField::ALL
            .into_iter()
            .filter(move |field| self.contains(*field))
    }

    /// Parse a list of field names such as `["body", "subject"]`
    pub fn parse<I, S>(names: I) -> Result<Self, UnknownFieldError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| name.as_ref().parse::<ContentField>())
            .collect()
    }
}

impl FromIterator<ContentField> for ClobberSet {
    fn from_iter<T: IntoIterator<Item = ContentField>>(iter: T) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_empty() {
        let set = ClobberSet::default();
        assert!(set.is_empty());
        assert!(ContentField::ALL.iter().all(|f| !set.contains(*f)));
    }

    #[test]
    fn test_parse_field_names() {
        let set = ClobberSet::parse(["body", " subject"]).unwrap();
        assert!(set.contains(ContentField::Body));
        assert!(set.contains(ContentField::Subject));
        assert!(!set.contains(ContentField::Sender));
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![ContentField::Subject, ContentField::Body]
        );
    }

    #[test]
    fn test_parse_rejects_volatile_fields() {
        assert!(ClobberSet::parse(["labels"]).is_err());
        assert!(ClobberSet::parse(["is_read"]).is_err());
    }

    #[test]
    fn test_all_contains_every_field() {
        let set = ClobberSet::all();
        assert_eq!(set.iter().count(), ContentField::ALL.len());
    }
}
