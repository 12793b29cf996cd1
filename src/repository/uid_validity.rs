use std::{fmt::Display, num::NonZeroU32};

/// Epoch under which the UIDs of a mailbox are meaningful.
///
/// A server assigns a new value whenever it cannot keep previously handed
/// out UIDs stable, so UIDs must only ever be compared together with the
/// validity they were observed under.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Copy)]
#[repr(transparent)]
pub struct UidValidity(NonZeroU32);

impl UidValidity {
    pub fn new(validity: NonZeroU32) -> Self {
        Self(validity)
    }
}

impl Display for UidValidity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<&u32> for UidValidity {
    type Error = &'static str;

    fn try_from(value: &u32) -> Result<Self, Self::Error> {
        (*value).try_into()
    }
}

impl TryFrom<u32> for UidValidity {
    type Error = &'static str;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        NonZeroU32::new(value)
            .map(UidValidity)
            .ok_or("uid validity should not be zero")
    }
}

impl From<UidValidity> for u32 {
    fn from(value: UidValidity) -> Self {
        value.0.into()
    }
}
