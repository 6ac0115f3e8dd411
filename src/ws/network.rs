/// Host connectivity notification.
///
/// `Offline` forces an immediate disconnect with no retry scheduled; `Online` triggers a
/// reconnect with a fresh attempt budget, since time spent offline should not count against it.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum NetworkSignal {
    Online,
    Offline,
}

impl From<bool> for NetworkSignal {
    fn from(online: bool) -> Self {
        if online { Self::Online } else { Self::Offline }
    }
}
