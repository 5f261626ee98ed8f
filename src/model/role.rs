use derive_more::Display;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Display)]
pub enum Role {
    #[display(fmt = "admin")]
    Admin = 1,
    #[display(fmt = "organizer")]
    Organizer = 2,
    #[display(fmt = "user")]
    User = 3,
}

const ADMIN_PERMISSIONS: &[&str] = &[
    "user:read",
    "user:create",
    "user:update",
    "user:delete",
    "event:read",
    "event:create",
    "event:update",
    "event:delete",
    "event:publish",
    "attendance:read",
    "attendance:create",
    "attendance:update",
    "attendance:delete",
];

const ORGANIZER_PERMISSIONS: &[&str] = &[
    "event:read",
    "event:create",
    "event:update",
    "event:delete",
    "event:publish",
    "attendance:read",
    "attendance:create",
    "attendance:update",
];

const USER_PERMISSIONS: &[&str] = &["event:read", "attendance:read"];

impl Role {
    /// Role assigned to self-registered accounts.
    pub const DEFAULT: Role = Role::User;

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Organizer),
            3 => Some(Role::User),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn permissions(self) -> &'static [&'static str] {
        match self {
            Role::Admin => ADMIN_PERMISSIONS,
            Role::Organizer => ORGANIZER_PERMISSIONS,
            Role::User => USER_PERMISSIONS,
        }
    }

    pub fn has_permission(self, permission: &str) -> bool {
        self.permissions().contains(&permission)
    }
}
