// ── Table identities ──

use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

/// Tables of the `Open_vSwitch` schema the client knows by name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, IntoStaticStr, EnumIter,
)]
pub enum TableKind {
    #[strum(serialize = "Open_vSwitch")]
    OpenVSwitch,
    Bridge,
    Port,
    Interface,
    Controller,
}

impl TableKind {
    /// Wire name of the table.
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// The typed cache fed by rows of this table, if any.
    pub fn typed(self) -> Option<TypedKind> {
        match self {
            Self::Bridge => Some(TypedKind::Bridge),
            Self::Port => Some(TypedKind::Port),
            Self::Interface => Some(TypedKind::Interface),
            Self::OpenVSwitch | Self::Controller => None,
        }
    }
}

/// Entity kinds that have a typed cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TypedKind {
    Bridge,
    Port,
    Interface,
}

impl TypedKind {
    /// Look up the typed kind for a wire table name. Unknown and untyped
    /// tables yield `None`.
    pub fn for_table(table: &str) -> Option<Self> {
        table.parse::<TableKind>().ok().and_then(TableKind::typed)
    }

    pub fn table(self) -> TableKind {
        match self {
            Self::Bridge => TableKind::Bridge,
            Self::Port => TableKind::Port,
            Self::Interface => TableKind::Interface,
        }
    }
}
