use crate::{
    config::Config,
    model::{Post, User, UserFlags, UserLevel},
};

/// The acting user of an operation, anonymous visitors get the defaults of an unregistered user.
#[derive(Clone, Debug)]
pub enum Actor {
    Anonymous,
    Authenticated(User),
}

impl Actor {
    pub fn user(&self) -> Option<&User> {
        match self {
            Actor::Anonymous => None,
            Actor::Authenticated(user) => Some(user),
        }
    }

    pub fn id(&self) -> i64 {
        self.user().map(|u| u.id).unwrap_or(0)
    }

    pub fn name(&self) -> &str {
        self.user().map(|u| u.name.as_str()).unwrap_or("Anonymous")
    }

    pub fn level(&self) -> UserLevel {
        self.user()
            .map(|u| u.level)
            .unwrap_or(UserLevel::Anonymous)
    }

    pub fn flags(&self) -> UserFlags {
        self.user().map(|u| u.flags).unwrap_or_default()
    }

    pub fn posts_per_page(&self, config: &Config) -> u32 {
        self.user()
            .and_then(|u| u32::try_from(u.posts_per_page).ok())
            .filter(|limit| *limit > 0)
            .unwrap_or(config.default_post_limit)
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Actor::Anonymous)
    }

    pub fn is_at_least(&self, level: UserLevel) -> bool {
        self.level() >= level
    }
}

impl From<Option<User>> for Actor {
    fn from(user: Option<User>) -> Self {
        match user {
            Some(user) => Actor::Authenticated(user),
            None => Actor::Anonymous,
        }
    }
}

/// Rating locks may only be set or cleared by privileged users.
pub fn can_edit_rating_lock(actor: &Actor) -> bool {
    actor.is_at_least(UserLevel::Privileged)
}

/// Ratings of unlocked posts may be changed by anyone able to edit tags, locked posts require privileges.
pub fn can_change_rating(actor: &Actor, post: &Post) -> bool {
    !post.is_rating_locked() || actor.is_at_least(UserLevel::Privileged)
}

pub fn is_approver(actor: &Actor) -> bool {
    actor.is_at_least(UserLevel::Janitor) || actor.flags().contains(UserFlags::APPROVER)
}

/// Flags a newly created user receives when none are given explicitly.
pub fn default_user_flags(level: UserLevel) -> UserFlags {
    if level >= UserLevel::Janitor {
        UserFlags::APPROVER
    } else {
        UserFlags::empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{Actor, can_edit_rating_lock, default_user_flags, is_approver};
    use crate::{
        config::Config,
        model::{User, UserFlags, UserLevel},
    };

    fn user(level: UserLevel, flags: UserFlags) -> User {
        User {
            id: 5,
            name: String::from("someone"),
            level,
            flags,
            posts_per_page: 0,
            favorite_count: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_anonymous_defaults() {
        let actor = Actor::Anonymous;
        assert_eq!(actor.id(), 0);
        assert_eq!(actor.name(), "Anonymous");
        assert_eq!(actor.level(), UserLevel::Anonymous);
        assert_eq!(actor.posts_per_page(&Config::default()), 75);
        assert!(!can_edit_rating_lock(&actor));
    }

    #[test]
    fn test_privileges() {
        let member = Actor::Authenticated(user(UserLevel::Member, UserFlags::empty()));
        let janitor = Actor::Authenticated(user(UserLevel::Janitor, UserFlags::empty()));
        let flagged_member = Actor::Authenticated(user(UserLevel::Member, UserFlags::APPROVER));
        assert!(!can_edit_rating_lock(&member));
        assert!(can_edit_rating_lock(&janitor));
        assert!(!is_approver(&member));
        assert!(is_approver(&janitor));
        assert!(is_approver(&flagged_member));
        assert_eq!(default_user_flags(UserLevel::Admin), UserFlags::APPROVER);
        assert_eq!(default_user_flags(UserLevel::Member), UserFlags::empty());
    }
}
