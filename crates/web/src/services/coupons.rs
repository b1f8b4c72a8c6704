//! Coupon service.
//!
//! Keeps one [`CouponList`] per user in a `moka` cache and routes every
//! mutation through the backend first. The cached list is only touched after
//! the backend confirms, so a failed call leaves it as it was.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use moka::future::Cache;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use coupix_core::{
    Coupon, CouponDraft, CouponId, CouponList, ImageError, ImageUpload, StatusFilter, UserId,
};

use crate::backend::{AuthSession, Backend, BackendError};

/// Errors from coupon operations.
#[derive(Debug, Error)]
pub enum CouponError {
    #[error("coupon not found")]
    NotFound,

    /// The row changed since the edit form was loaded.
    #[error("coupon was changed elsewhere")]
    Conflict,

    /// Delete from the active view on a coupon that is no longer active.
    #[error("coupon is no longer active")]
    NotActive,

    #[error("image rejected: {0}")]
    Image(#[from] ImageError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

impl CouponError {
    /// Message shown to the user as a flash notification.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::NotFound => "Coupon not found",
            Self::Conflict => {
                "This coupon was changed in another window. Reload it and try again"
            }
            Self::NotActive => "This coupon is no longer active",
            Self::Image(ImageError::TooLarge { .. }) => "Image must be 2 MB or smaller",
            Self::Image(ImageError::UnsupportedType(_)) => {
                "Image must be a JPEG, PNG, GIF or WebP file"
            }
            Self::Image(ImageError::Empty) => "The uploaded image is empty",
            Self::Backend(BackendError::Storage(_)) => "Failed to upload image",
            Self::Backend(BackendError::RateLimited(_)) => {
                "Too many requests, please try again shortly"
            }
            Self::Backend(_) => "Something went wrong, please try again",
        }
    }
}

/// What to do with a coupon's image on update.
#[derive(Debug)]
pub enum ImageChange {
    Keep,
    Remove,
    Replace(ImageUpload),
}

type SharedList = Arc<Mutex<CouponList>>;

fn lock(list: &SharedList) -> MutexGuard<'_, CouponList> {
    list.lock().unwrap_or_else(PoisonError::into_inner)
}

fn shared(coupons: Vec<Coupon>) -> SharedList {
    Arc::new(Mutex::new(CouponList::from_fetched(coupons)))
}

/// Coupon operations for signed-in users.
///
/// Cheap to clone; all clones share the backend handle and the cache.
#[derive(Clone)]
pub struct CouponService {
    backend: Arc<dyn Backend>,
    lists: Cache<UserId, SharedList>,
}

impl CouponService {
    /// Create a service whose per-user lists expire after `idle` without access.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, idle: Duration) -> Self {
        let lists = Cache::builder()
            .max_capacity(10_000)
            .time_to_idle(idle)
            .build();
        Self { backend, lists }
    }

    /// The user's cached list, fetching it on a miss.
    ///
    /// Concurrent misses for the same user share one fetch and one list.
    async fn list_for(&self, session: &AuthSession) -> Result<SharedList, CouponError> {
        let owner = session.user_id();
        self.lists
            .try_get_with(owner, async {
                let fetched = self.backend.list_coupons(&session.token(), owner).await?;
                debug!(user_id = %owner, count = fetched.len(), "Loaded coupon list");
                Ok::<_, BackendError>(shared(fetched))
            })
            .await
            .map_err(|e| CouponError::Backend(BackendError::from_shared(e)))
    }

    /// Fetch the full list and replace the cached one.
    ///
    /// # Errors
    ///
    /// Returns `CouponError::Backend` if the fetch fails; the cached list is
    /// left unchanged.
    #[instrument(skip(self, session), fields(user_id = %session.user_id()))]
    pub async fn load(&self, session: &AuthSession) -> Result<(), CouponError> {
        let owner = session.user_id();
        let mut fetched = Some(self.backend.list_coupons(&session.token(), owner).await?);
        let list = self
            .lists
            .get_with(owner, async { shared(fetched.take().unwrap_or_default()) })
            .await;
        // Not taken: another request had already cached a list.
        if let Some(fetched) = fetched {
            lock(&list).replace_all(fetched);
        }
        Ok(())
    }

    /// Snapshot of the user's coupons, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CouponError::Backend` if the list has to be fetched and the
    /// fetch fails.
    pub async fn list(&self, session: &AuthSession) -> Result<CouponList, CouponError> {
        let list = self.list_for(session).await?;
        let snapshot = lock(&list).clone();
        Ok(snapshot)
    }

    /// Look up one coupon, from the cached list or the backend.
    ///
    /// # Errors
    ///
    /// Returns `CouponError::NotFound` if the user has no such coupon.
    pub async fn get(&self, session: &AuthSession, id: CouponId) -> Result<Coupon, CouponError> {
        let list = self.list_for(session).await?;
        if let Some(coupon) = lock(&list).get(id).cloned() {
            return Ok(coupon);
        }
        self.fetch(session, id).await?.ok_or(CouponError::NotFound)
    }

    async fn fetch(
        &self,
        session: &AuthSession,
        id: CouponId,
    ) -> Result<Option<Coupon>, CouponError> {
        Ok(self
            .backend
            .get_coupon(&session.token(), session.user_id(), id)
            .await?)
    }

    async fn upload(
        &self,
        session: &AuthSession,
        image: &ImageUpload,
    ) -> Result<String, CouponError> {
        let key = image.object_key(session.user_id(), Uuid::new_v4());
        let url = self
            .backend
            .upload_image(&session.token(), &key, image)
            .await
            .inspect_err(|e| warn!(error = %e, key = %key, "Image upload failed"))?;
        debug!(key = %key, "Image uploaded");
        Ok(url)
    }

    /// Delete an image no coupon refers to any more.
    async fn discard_image(&self, session: &AuthSession, image_url: Option<&str>) {
        let Some(image_url) = image_url else {
            return;
        };
        match self.backend.delete_image(&session.token(), image_url).await {
            Ok(()) => debug!("Image deleted"),
            Err(e) => warn!(error = %e, "Failed to delete image"),
        }
    }

    /// Store a new coupon, uploading its image first.
    ///
    /// # Errors
    ///
    /// Returns `CouponError::Backend` if the upload or the insert fails. An
    /// image uploaded for a failed insert is deleted again.
    #[instrument(skip(self, session, draft, image), fields(user_id = %session.user_id()))]
    pub async fn create(
        &self,
        session: &AuthSession,
        mut draft: CouponDraft,
        image: Option<ImageUpload>,
    ) -> Result<Coupon, CouponError> {
        let list = self.list_for(session).await?;
        if let Some(image) = image {
            draft.image_url = Some(self.upload(session, &image).await?);
        }

        let coupon = match self
            .backend
            .insert_coupon(&session.token(), session.user_id(), &draft)
            .await
        {
            Ok(coupon) => coupon,
            Err(e) => {
                warn!(error = %e, "Coupon insert failed");
                self.discard_image(session, draft.image_url.as_deref()).await;
                return Err(e.into());
            }
        };

        {
            let mut list = lock(&list);
            if list.get(coupon.id).is_none() {
                list.prepend(coupon.clone());
            }
        }
        info!(coupon_id = %coupon.id, "Coupon created");
        Ok(coupon)
    }

    /// Overwrite a coupon's editable fields.
    ///
    /// `expected_updated_at` is the version the edit form was loaded with.
    /// Whichever image ends up unreferenced, the replaced one or a new upload
    /// for a failed update, is deleted.
    ///
    /// # Errors
    ///
    /// Returns `CouponError::Conflict` if the row changed since then,
    /// `CouponError::NotFound` if it is gone.
    #[instrument(skip(self, session, existing, draft, image), fields(user_id = %session.user_id(), coupon_id = %existing.id))]
    pub async fn update(
        &self,
        session: &AuthSession,
        existing: &Coupon,
        expected_updated_at: DateTime<Utc>,
        mut draft: CouponDraft,
        image: ImageChange,
    ) -> Result<Coupon, CouponError> {
        let list = self.list_for(session).await?;
        let uploaded = match image {
            ImageChange::Keep => {
                draft.image_url.clone_from(&existing.image_url);
                None
            }
            ImageChange::Remove => {
                draft.image_url = None;
                None
            }
            ImageChange::Replace(image) => {
                let url = self.upload(session, &image).await?;
                draft.image_url = Some(url.clone());
                Some(url)
            }
        };

        let result = self
            .backend
            .update_coupon(
                &session.token(),
                session.user_id(),
                existing.id,
                &draft,
                expected_updated_at,
            )
            .await;
        let updated = match result {
            Ok(updated) => updated,
            Err(e) => {
                warn!(error = %e, "Coupon update failed");
                self.discard_image(session, uploaded.as_deref()).await;
                return Err(e.into());
            }
        };

        if let Some(coupon) = updated {
            lock(&list).replace(coupon.clone());
            if coupon.image_url != existing.image_url {
                self.discard_image(session, existing.image_url.as_deref()).await;
            }
            info!("Coupon updated");
            return Ok(coupon);
        }

        self.discard_image(session, uploaded.as_deref()).await;
        match self.fetch(session, existing.id).await? {
            Some(current) => {
                warn!("Coupon update conflict");
                lock(&list).replace(current);
                Err(CouponError::Conflict)
            }
            None => {
                lock(&list).remove(existing.id);
                Err(CouponError::NotFound)
            }
        }
    }

    /// Mark a coupon as redeemed.
    ///
    /// Redeeming an already redeemed coupon returns it unchanged.
    ///
    /// # Errors
    ///
    /// Returns `CouponError::NotFound` if the user has no such coupon.
    #[instrument(skip(self, session), fields(user_id = %session.user_id(), coupon_id = %id))]
    pub async fn redeem(&self, session: &AuthSession, id: CouponId) -> Result<Coupon, CouponError> {
        let list = self.list_for(session).await?;
        if let Some(coupon) = lock(&list).get(id).filter(|c| c.is_redeemed).cloned() {
            debug!("Coupon already redeemed");
            return Ok(coupon);
        }

        let redeemed = self
            .backend
            .redeem_coupon(&session.token(), session.user_id(), id)
            .await
            .inspect_err(|e| warn!(error = %e, "Coupon redeem failed"))?;

        let coupon = match redeemed {
            Some(coupon) => {
                info!("Coupon redeemed");
                coupon
            }
            // No unredeemed row matched: redeemed elsewhere, or gone.
            None => match self.fetch(session, id).await? {
                Some(coupon) if coupon.is_redeemed => coupon,
                _ => {
                    lock(&list).remove(id);
                    return Err(CouponError::NotFound);
                }
            },
        };

        lock(&list).replace(coupon.clone());
        Ok(coupon)
    }

    /// Delete a coupon.
    ///
    /// `view` is the list filter the request was issued from. From the active
    /// view, only coupons that are still active can be deleted.
    ///
    /// # Errors
    ///
    /// Returns `CouponError::NotActive` for a stale delete from the active
    /// view, `CouponError::NotFound` if the coupon is gone.
    #[instrument(skip(self, session), fields(user_id = %session.user_id(), coupon_id = %id))]
    pub async fn delete(
        &self,
        session: &AuthSession,
        id: CouponId,
        view: StatusFilter,
        today: NaiveDate,
    ) -> Result<(), CouponError> {
        let list = self.list_for(session).await?;

        if view == StatusFilter::Active {
            let Some(current) = self.fetch(session, id).await? else {
                lock(&list).remove(id);
                return Err(CouponError::NotFound);
            };
            if !current.is_active(today) {
                info!(status = ?current.status(today), "Rejected delete of inactive coupon from active view");
                lock(&list).replace(current);
                return Err(CouponError::NotActive);
            }
        }

        let image_url = lock(&list).get(id).and_then(|c| c.image_url.clone());
        let deleted = self
            .backend
            .delete_coupon(&session.token(), session.user_id(), id)
            .await
            .inspect_err(|e| warn!(error = %e, "Coupon delete failed"))?;

        lock(&list).remove(id);
        if deleted {
            info!("Coupon deleted");
            self.discard_image(session, image_url.as_deref()).await;
            Ok(())
        } else {
            Err(CouponError::NotFound)
        }
    }

    /// Drop the user's cached list.
    pub async fn forget(&self, user: UserId) {
        self.lists.invalidate(&user).await;
    }
}
