//! In-process backend.
//!
//! Implements the same contracts as the hosted backend: row access is
//! restricted to the token's owner, redeem and update only match rows in the
//! expected state, and auth failures carry the same error codes. Used by the
//! tests and by `COUPIX_BACKEND=memory` for local demos.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use coupix_core::{Coupon, CouponDraft, CouponId, Email, ImageUpload, NewProfile, Profile, UserId};

use crate::backend::{
    AccessToken, AuthApi, AuthSession, AuthUser, BackendError, SignUpOutcome, StorageApi,
    TableApi, codes,
};

/// Lifetime of issued access tokens.
const DEFAULT_TOKEN_TTL: chrono::Duration = chrono::Duration::hours(1);

/// In-memory implementation of every backend port.
#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<State>,
    token_ttl: chrono::Duration,
    require_confirmation: bool,
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<Email, Account>,
    access_tokens: HashMap<String, (UserId, DateTime<Utc>)>,
    refresh_tokens: HashMap<String, UserId>,
    coupons: Vec<Coupon>,
    profiles: HashMap<UserId, Profile>,
    objects: HashMap<String, String>,
    failures: Failures,
}

/// Operations switched to fail with a 503 API error.
#[derive(Debug, Default, Clone, Copy)]
struct Failures {
    coupon_writes: bool,
    profile_delete: bool,
}

fn unavailable() -> BackendError {
    BackendError::Api {
        status: 503,
        code: None,
        message: "Service unavailable".to_string(),
    }
}

#[derive(Debug, Clone)]
struct Account {
    user: AuthUser,
    password_hash: String,
    confirmed: bool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            token_ttl: DEFAULT_TOKEN_TTL,
            require_confirmation: false,
        }
    }

    /// Issue access tokens with a custom lifetime.
    ///
    /// A zero or negative lifetime yields tokens that are already expired,
    /// which forces a refresh on the next authenticated request.
    #[must_use]
    pub const fn with_token_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Require email confirmation before new accounts can sign in.
    #[must_use]
    pub const fn with_email_confirmation(mut self) -> Self {
        self.require_confirmation = true;
        self
    }

    /// Mark an account as confirmed.
    pub fn confirm_email(&self, email: &Email) {
        if let Some(account) = self.lock().accounts.get_mut(email) {
            account.confirmed = true;
        }
    }

    /// Number of stored coupons across all users.
    #[must_use]
    pub fn coupon_count(&self) -> usize {
        self.lock().coupons.len()
    }

    /// Number of stored image objects.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    /// Make coupon inserts and updates fail until switched back.
    pub fn fail_coupon_writes(&self, fail: bool) {
        self.lock().failures.coupon_writes = fail;
    }

    /// Make profile deletion fail until switched back.
    pub fn fail_profile_delete(&self, fail: bool) {
        self.lock().failures.profile_delete = fail;
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn issue_session(&self, state: &mut State, user: AuthUser) -> AuthSession {
        let access_token = Uuid::new_v4().simple().to_string();
        let refresh_token = Uuid::new_v4().simple().to_string();
        let expires_at = Utc::now() + self.token_ttl;

        state
            .access_tokens
            .insert(access_token.clone(), (user.id, expires_at));
        state.refresh_tokens.insert(refresh_token.clone(), user.id);

        AuthSession {
            access_token,
            refresh_token,
            expires_at,
            user,
        }
    }
}

fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    format!("{digest:x}")
}

impl State {
    /// Resolve a token to its user, rejecting unknown and expired tokens.
    fn authorize(&self, token: &AccessToken) -> Result<UserId, BackendError> {
        match self.access_tokens.get(token.expose()) {
            Some((user_id, expires_at)) if *expires_at > Utc::now() => Ok(*user_id),
            _ => Err(BackendError::Unauthorized),
        }
    }

    /// Resolve a token and require it to belong to `owner`.
    fn authorize_owner(&self, token: &AccessToken, owner: UserId) -> Result<(), BackendError> {
        if self.authorize(token)? == owner {
            Ok(())
        } else {
            Err(BackendError::PolicyViolation(
                "row belongs to another user".to_string(),
            ))
        }
    }

    fn user(&self, id: UserId) -> Option<&AuthUser> {
        self.accounts
            .values()
            .map(|account| &account.user)
            .find(|user| user.id == id)
    }

    fn coupon_mut(&mut self, owner: UserId, id: CouponId) -> Option<&mut Coupon> {
        self.coupons
            .iter_mut()
            .find(|c| c.id == id && c.user_id == owner)
    }
}

/// A timestamp strictly later than `previous`, so every write changes `updated_at`.
fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + chrono::Duration::microseconds(1)
    }
}

fn apply_draft(coupon: &mut Coupon, draft: &CouponDraft) {
    coupon.store = draft.store.clone();
    coupon.amount = draft.amount;
    coupon.description.clone_from(&draft.description);
    coupon.link.clone_from(&draft.link);
    coupon.image_url.clone_from(&draft.image_url);
    coupon.coupon_code.clone_from(&draft.coupon_code);
    coupon.expiry_date = draft.expiry_date;
}

// =============================================================================
// Auth
// =============================================================================

#[async_trait]
impl AuthApi for MemoryBackend {
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<AuthSession, BackendError> {
        let mut state = self.lock();
        let account = state
            .accounts
            .get(email)
            .filter(|account| account.password_hash == hash_password(password))
            .cloned()
            .ok_or_else(|| {
                BackendError::api(400, codes::INVALID_CREDENTIALS, "Invalid login credentials")
            })?;
        if !account.confirmed {
            return Err(BackendError::api(400, codes::EMAIL_NOT_CONFIRMED, "Email not confirmed"));
        }
        Ok(self.issue_session(&mut state, account.user))
    }

    async fn sign_up(
        &self,
        email: &Email,
        password: &str,
        name: &str,
    ) -> Result<SignUpOutcome, BackendError> {
        let mut state = self.lock();
        if state.accounts.contains_key(email) {
            return Err(BackendError::api(
                422,
                codes::USER_ALREADY_EXISTS,
                "User already registered",
            ));
        }

        let user = AuthUser {
            id: UserId::random(),
            email: email.clone(),
            name: Some(name.to_string()),
        };
        state.accounts.insert(
            email.clone(),
            Account {
                user: user.clone(),
                password_hash: hash_password(password),
                confirmed: !self.require_confirmation,
            },
        );

        if self.require_confirmation {
            Ok(SignUpOutcome::ConfirmationRequired(user))
        } else {
            Ok(SignUpOutcome::SignedIn(self.issue_session(&mut state, user)))
        }
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession, BackendError> {
        let mut state = self.lock();
        let user_id = state.refresh_tokens.remove(refresh_token).ok_or_else(|| {
            BackendError::api(400, codes::REFRESH_TOKEN_NOT_FOUND, "Invalid Refresh Token")
        })?;
        let user = state
            .user(user_id)
            .cloned()
            .ok_or_else(|| BackendError::api(403, codes::SESSION_NOT_FOUND, "User not found"))?;
        Ok(self.issue_session(&mut state, user))
    }

    async fn sign_out(&self, token: &AccessToken) -> Result<(), BackendError> {
        let mut state = self.lock();
        let (user_id, _) = state
            .access_tokens
            .remove(token.expose())
            .ok_or(BackendError::Unauthorized)?;
        state.refresh_tokens.retain(|_, owner| *owner != user_id);
        Ok(())
    }

    async fn update_password(
        &self,
        token: &AccessToken,
        new_password: &str,
    ) -> Result<(), BackendError> {
        let mut state = self.lock();
        let user_id = state.authorize(token)?;
        let account = state
            .accounts
            .values_mut()
            .find(|account| account.user.id == user_id)
            .ok_or(BackendError::NotFound)?;
        account.password_hash = hash_password(new_password);
        Ok(())
    }

    async fn health(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

// =============================================================================
// Tables
// =============================================================================

#[async_trait]
impl TableApi for MemoryBackend {
    async fn list_coupons(
        &self,
        token: &AccessToken,
        owner: UserId,
    ) -> Result<Vec<Coupon>, BackendError> {
        let mut coupons: Vec<Coupon> = {
            let state = self.lock();
            state.authorize_owner(token, owner)?;
            state
                .coupons
                .iter()
                .filter(|c| c.user_id == owner)
                .cloned()
                .collect()
        };
        coupons.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        // Suspend like a network read so concurrent requests interleave.
        tokio::task::yield_now().await;
        Ok(coupons)
    }

    async fn get_coupon(
        &self,
        token: &AccessToken,
        owner: UserId,
        id: CouponId,
    ) -> Result<Option<Coupon>, BackendError> {
        let state = self.lock();
        state.authorize_owner(token, owner)?;
        Ok(state
            .coupons
            .iter()
            .find(|c| c.id == id && c.user_id == owner)
            .cloned())
    }

    async fn insert_coupon(
        &self,
        token: &AccessToken,
        owner: UserId,
        draft: &CouponDraft,
    ) -> Result<Coupon, BackendError> {
        let mut state = self.lock();
        state.authorize_owner(token, owner)?;
        if state.failures.coupon_writes {
            return Err(unavailable());
        }

        let newest = state.coupons.iter().map(|c| c.created_at).max();
        let now = newest.map_or_else(Utc::now, next_timestamp);
        let coupon = Coupon {
            id: CouponId::random(),
            user_id: owner,
            store: draft.store.clone(),
            amount: draft.amount,
            description: draft.description.clone(),
            link: draft.link.clone(),
            image_url: draft.image_url.clone(),
            coupon_code: draft.coupon_code.clone(),
            expiry_date: draft.expiry_date,
            is_redeemed: false,
            created_at: now,
            updated_at: now,
        };
        state.coupons.push(coupon.clone());
        Ok(coupon)
    }

    async fn update_coupon(
        &self,
        token: &AccessToken,
        owner: UserId,
        id: CouponId,
        draft: &CouponDraft,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<Option<Coupon>, BackendError> {
        let mut state = self.lock();
        state.authorize_owner(token, owner)?;
        if state.failures.coupon_writes {
            return Err(unavailable());
        }
        let Some(coupon) = state
            .coupon_mut(owner, id)
            .filter(|c| c.updated_at == expected_updated_at)
        else {
            return Ok(None);
        };
        apply_draft(coupon, draft);
        coupon.updated_at = next_timestamp(coupon.updated_at);
        Ok(Some(coupon.clone()))
    }

    async fn redeem_coupon(
        &self,
        token: &AccessToken,
        owner: UserId,
        id: CouponId,
    ) -> Result<Option<Coupon>, BackendError> {
        let mut state = self.lock();
        state.authorize_owner(token, owner)?;
        let Some(coupon) = state.coupon_mut(owner, id).filter(|c| !c.is_redeemed) else {
            return Ok(None);
        };
        coupon.is_redeemed = true;
        coupon.updated_at = next_timestamp(coupon.updated_at);
        Ok(Some(coupon.clone()))
    }

    async fn delete_coupon(
        &self,
        token: &AccessToken,
        owner: UserId,
        id: CouponId,
    ) -> Result<bool, BackendError> {
        let mut state = self.lock();
        state.authorize_owner(token, owner)?;
        let before = state.coupons.len();
        state.coupons.retain(|c| !(c.id == id && c.user_id == owner));
        Ok(state.coupons.len() < before)
    }

    async fn delete_all_coupons(
        &self,
        token: &AccessToken,
        owner: UserId,
    ) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.authorize_owner(token, owner)?;
        state.coupons.retain(|c| c.user_id != owner);
        Ok(())
    }

    async fn insert_profile_if_absent(
        &self,
        token: &AccessToken,
        profile: &NewProfile,
    ) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.authorize_owner(token, profile.id)?;
        state.profiles.entry(profile.id).or_insert_with(|| Profile {
            id: profile.id,
            name: profile.name.clone(),
            email: profile.email.clone(),
        });
        Ok(())
    }

    async fn get_profile(
        &self,
        token: &AccessToken,
        id: UserId,
    ) -> Result<Option<Profile>, BackendError> {
        let state = self.lock();
        state.authorize_owner(token, id)?;
        Ok(state.profiles.get(&id).cloned())
    }

    async fn update_profile_name(
        &self,
        token: &AccessToken,
        id: UserId,
        name: &str,
    ) -> Result<Option<Profile>, BackendError> {
        let mut state = self.lock();
        state.authorize_owner(token, id)?;
        Ok(state.profiles.get_mut(&id).map(|profile| {
            profile.name = name.to_string();
            profile.clone()
        }))
    }

    async fn delete_profile(&self, token: &AccessToken, id: UserId) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.authorize_owner(token, id)?;
        if state.failures.profile_delete {
            return Err(unavailable());
        }
        state.profiles.remove(&id);
        Ok(())
    }
}

// =============================================================================
// Storage
// =============================================================================

#[async_trait]
impl StorageApi for MemoryBackend {
    /// Stores the image and returns it as a `data:` URL, since there is no
    /// object server to link to.
    async fn upload_image(
        &self,
        token: &AccessToken,
        key: &str,
        image: &ImageUpload,
    ) -> Result<String, BackendError> {
        let mut state = self.lock();
        let user_id = state.authorize(token)?;
        if !key.starts_with(&format!("{user_id}/")) {
            return Err(BackendError::Storage(
                "objects must be stored under the owner's folder".to_string(),
            ));
        }
        if state.objects.contains_key(key) {
            return Err(BackendError::Storage("The resource already exists".to_string()));
        }

        let url = format!(
            "data:{};base64,{}",
            image.content_type(),
            STANDARD.encode(image.bytes())
        );
        state.objects.insert(key.to_string(), url.clone());
        Ok(url)
    }

    async fn delete_image(&self, token: &AccessToken, image_url: &str) -> Result<(), BackendError> {
        let mut state = self.lock();
        let folder = format!("{}/", state.authorize(token)?);
        let key = state
            .objects
            .iter()
            .find(|(key, url)| key.starts_with(&folder) && url.as_str() == image_url)
            .map(|(key, _)| key.clone());
        if let Some(key) = key {
            state.objects.remove(&key);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use coupix_core::{Amount, StoreName};

    use super::*;

    fn email(s: &str) -> Email {
        Email::parse(s).unwrap()
    }

    fn draft(store: &str, amount: i64) -> CouponDraft {
        CouponDraft {
            store: StoreName::parse(store).unwrap(),
            amount: Amount::from_whole(amount).unwrap(),
            description: None,
            link: None,
            image_url: None,
            coupon_code: None,
            expiry_date: None,
        }
    }

    async fn signed_in(backend: &MemoryBackend, address: &str) -> AuthSession {
        match backend.sign_up(&email(address), "secret1", "Test").await.unwrap() {
            SignUpOutcome::SignedIn(session) => session,
            SignUpOutcome::ConfirmationRequired(_) => panic!("confirmation not expected"),
        }
    }

    #[tokio::test]
    async fn test_sign_in_codes() {
        let backend = MemoryBackend::new();
        signed_in(&backend, "a@example.com").await;

        let err = backend
            .sign_in_with_password(&email("a@example.com"), "wrong-password")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(codes::INVALID_CREDENTIALS));

        let err = backend
            .sign_up(&email("a@example.com"), "secret1", "Again")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(codes::USER_ALREADY_EXISTS));

        assert!(backend
            .sign_in_with_password(&email("a@example.com"), "secret1")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_email_confirmation() {
        let backend = MemoryBackend::new().with_email_confirmation();
        let outcome = backend
            .sign_up(&email("c@example.com"), "secret1", "C")
            .await
            .unwrap();
        assert!(matches!(outcome, SignUpOutcome::ConfirmationRequired(_)));

        let err = backend
            .sign_in_with_password(&email("c@example.com"), "secret1")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(codes::EMAIL_NOT_CONFIRMED));

        backend.confirm_email(&email("c@example.com"));
        assert!(backend
            .sign_in_with_password(&email("c@example.com"), "secret1")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_rows_are_scoped_to_owner() {
        let backend = MemoryBackend::new();
        let alice = signed_in(&backend, "alice@example.com").await;
        let bob = signed_in(&backend, "bob@example.com").await;

        let coupon = backend
            .insert_coupon(&alice.token(), alice.user_id(), &draft("BUYME", 100))
            .await
            .unwrap();

        let err = backend
            .list_coupons(&bob.token(), alice.user_id())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::PolicyViolation(_)));

        assert!(backend
            .get_coupon(&bob.token(), bob.user_id(), coupon.id)
            .await
            .unwrap()
            .is_none());
        assert!(!backend
            .delete_coupon(&bob.token(), bob.user_id(), coupon.id)
            .await
            .unwrap());
        assert_eq!(backend.coupon_count(), 1);
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let backend = MemoryBackend::new();
        let session = signed_in(&backend, "n@example.com").await;
        let token = session.token();
        let first = backend
            .insert_coupon(&token, session.user_id(), &draft("BUYME", 100))
            .await
            .unwrap();
        let second = backend
            .insert_coupon(&token, session.user_id(), &draft("כללית", 30))
            .await
            .unwrap();

        let listed = backend.list_coupons(&token, session.user_id()).await.unwrap();
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
        assert!(second.created_at > first.created_at);
    }

    #[tokio::test]
    async fn test_update_requires_matching_timestamp() {
        let backend = MemoryBackend::new();
        let session = signed_in(&backend, "u@example.com").await;
        let token = session.token();
        let coupon = backend
            .insert_coupon(&token, session.user_id(), &draft("BUYME", 100))
            .await
            .unwrap();

        let updated = backend
            .update_coupon(&token, session.user_id(), coupon.id, &draft("BUYME", 200), coupon.updated_at)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.amount.to_i64(), 200);
        assert!(updated.updated_at > coupon.updated_at);

        let stale = backend
            .update_coupon(&token, session.user_id(), coupon.id, &draft("BUYME", 50), coupon.updated_at)
            .await
            .unwrap();
        assert!(stale.is_none());
    }

    #[tokio::test]
    async fn test_redeem_matches_only_unredeemed() {
        let backend = MemoryBackend::new();
        let session = signed_in(&backend, "r@example.com").await;
        let token = session.token();
        let coupon = backend
            .insert_coupon(&token, session.user_id(), &draft("BUYME", 100))
            .await
            .unwrap();

        let redeemed = backend
            .redeem_coupon(&token, session.user_id(), coupon.id)
            .await
            .unwrap();
        assert!(redeemed.unwrap().is_redeemed);
        assert!(backend
            .redeem_coupon(&token, session.user_id(), coupon.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_expired_token_is_unauthorized_until_refreshed() {
        let backend = MemoryBackend::new().with_token_ttl(chrono::Duration::zero());
        let session = signed_in(&backend, "e@example.com").await;

        let err = backend
            .list_coupons(&session.token(), session.user_id())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Unauthorized));

        let refreshed = backend.refresh_session(&session.refresh_token).await.unwrap();
        assert_eq!(refreshed.user_id(), session.user_id());

        let err = backend.refresh_session(&session.refresh_token).await.unwrap_err();
        assert_eq!(err.code(), Some(codes::REFRESH_TOKEN_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_upload_requires_owner_folder() {
        let backend = MemoryBackend::new();
        let session = signed_in(&backend, "i@example.com").await;
        let image = ImageUpload::validate("image/png", vec![1, 2, 3]).unwrap();

        let url = backend
            .upload_image(&session.token(), &format!("{}/a.png", session.user_id()), &image)
            .await
            .unwrap();
        assert!(url.starts_with("data:image/png;base64,"));

        let err = backend
            .upload_image(&session.token(), "someone-else/a.png", &image)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Storage(_)));
        assert_eq!(backend.object_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_image_only_in_owner_folder() {
        let backend = MemoryBackend::new();
        let owner = signed_in(&backend, "o@example.com").await;
        let other = signed_in(&backend, "x@example.com").await;
        let image = ImageUpload::validate("image/png", vec![4, 5, 6]).unwrap();
        let url = backend
            .upload_image(&owner.token(), &format!("{}/b.png", owner.user_id()), &image)
            .await
            .unwrap();

        backend.delete_image(&other.token(), &url).await.unwrap();
        assert_eq!(backend.object_count(), 1);

        backend.delete_image(&owner.token(), &url).await.unwrap();
        assert_eq!(backend.object_count(), 0);
        backend.delete_image(&owner.token(), &url).await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_switches() {
        let backend = MemoryBackend::new();
        let session = signed_in(&backend, "f@example.com").await;
        let token = session.token();

        backend.fail_coupon_writes(true);
        let err = backend
            .insert_coupon(&token, session.user_id(), &draft("BUYME", 100))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Api { status: 503, .. }));
        backend.fail_coupon_writes(false);
        backend
            .insert_coupon(&token, session.user_id(), &draft("BUYME", 100))
            .await
            .unwrap();

        backend.fail_profile_delete(true);
        assert!(backend.delete_profile(&token, session.user_id()).await.is_err());
    }
}
