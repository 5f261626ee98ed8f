use actix_web::{
    FromRequest, HttpMessage, HttpRequest,
    dev::Payload,
    error::{ErrorForbidden, ErrorInternalServerError, ErrorUnauthorized},
    web::Data,
};
use futures::future::{Ready, ready};
use tracing::debug;

use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::model::role::Role;
use crate::models::{Claims, TokenType};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub email: String,
    pub role: Role,
}

impl TryFrom<Claims> for AuthUser {
    type Error = &'static str;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        if claims.token_type != TokenType::Access {
            return Err("Access token required");
        }
        let role = Role::from_id(claims.role).ok_or("Invalid role")?;
        Ok(AuthUser {
            user_id: claims.user_id,
            email: claims.sub,
            role,
        })
    }
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // set by auth_middleware on protected scopes
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let token = match req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
        {
            Some(t) => t,
            None => return ready(Err(ErrorUnauthorized("Missing token"))),
        };

        let config = match req.app_data::<Data<Config>>() {
            Some(c) => c,
            None => return ready(Err(ErrorInternalServerError("Config missing"))),
        };

        let claims = match verify_token(token, &config.jwt_secret) {
            Ok(c) => c,
            Err(_) => return ready(Err(ErrorUnauthorized("Invalid token"))),
        };

        ready(AuthUser::try_from(claims).map_err(ErrorUnauthorized))
    }
}

impl AuthUser {
    pub fn require_permission(&self, permission: &str) -> actix_web::Result<()> {
        if self.role.has_permission(permission) {
            Ok(())
        } else {
            debug!(
                user_id = self.user_id,
                email = %self.email,
                role = %self.role,
                permission,
                "Permission denied"
            );
            Err(ErrorForbidden(format!("Missing permission: {}", permission)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn claims(role: u8, token_type: TokenType) -> Claims {
        Claims {
            user_id: 5,
            sub: "org@example.com".into(),
            role,
            exp: 0,
            jti: "jti".into(),
            token_type,
        }
    }

    #[test]
    fn refresh_tokens_do_not_authenticate() {
        assert!(AuthUser::try_from(claims(2, TokenType::Refresh)).is_err());
        assert!(AuthUser::try_from(claims(9, TokenType::Access)).is_err());
    }

    #[rstest]
    #[case(Role::Admin.id(), "attendance:update", true)]
    #[case(Role::Organizer.id(), "event:update", true)]
    #[case(Role::User.id(), "event:update", false)]
    #[case(Role::User.id(), "attendance:update", false)]
    fn permission_checks_follow_role(
        #[case] role: u8,
        #[case] permission: &str,
        #[case] allowed: bool,
    ) {
        let user = AuthUser::try_from(claims(role, TokenType::Access)).unwrap();
        assert_eq!(user.email, "org@example.com");
        assert_eq!(user.require_permission(permission).is_ok(), allowed);
    }
}
