//! Training-image staging. Food photos land under an uncategorized prefix and
//! move to their menu's folder once the user confirms or corrects the label.

use anyhow::Context;
use bytes::Bytes;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::state::AppState;

pub const RETRAIN_PREFIX: &str = "retrain_images";
const UNCATEGORIZED: &str = "uncategorized";
const PREVIEW_TTL_SECS: u64 = 10 * 60;

pub struct UploadItem<'a> {
    pub body: Bytes,
    pub content_type: &'a str,
}

pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

pub fn uncategorized_key(handle: &str, id: Uuid, ext: &str) -> String {
    format!("{RETRAIN_PREFIX}/{UNCATEGORIZED}/{handle}_{id}.{ext}")
}

/// Destination of a staged key once the menu is known: same file name,
/// menu id as folder.
pub fn categorized_key(staged_key: &str, menu_id: i64) -> anyhow::Result<String> {
    let file = staged_key
        .strip_prefix(&format!("{RETRAIN_PREFIX}/{UNCATEGORIZED}/"))
        .filter(|f| !f.is_empty() && !f.contains('/'))
        .with_context(|| format!("{staged_key} is not a staged image key"))?;
    Ok(format!("{RETRAIN_PREFIX}/{menu_id}/{file}"))
}

#[instrument(skip(st, img), fields(bytes = img.body.len()))]
pub async fn stage_uncategorized(st: &AppState, handle: &str, img: UploadItem<'_>) -> anyhow::Result<String> {
    anyhow::ensure!(!img.body.is_empty(), "empty image");
    let ext = ext_from_mime(img.content_type).unwrap_or("jpg");
    let key = uncategorized_key(handle, Uuid::new_v4(), ext);
    st.storage
        .put_object(&key, img.body, img.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    debug!(%key, "image staged");
    Ok(key)
}

#[instrument(skip(st))]
pub async fn categorize(st: &AppState, staged_key: &str, menu_id: i64) -> anyhow::Result<String> {
    let dest = categorized_key(staged_key, menu_id)?;
    st.storage
        .move_object(staged_key, &dest)
        .await
        .with_context(|| format!("move {} -> {}", staged_key, dest))?;
    debug!(%dest, "image categorized");
    Ok(dest)
}

pub async fn preview_url(st: &AppState, key: &str) -> anyhow::Result<String> {
    st.storage
        .presign_get(key, PREVIEW_TTL_SECS)
        .await
        .with_context(|| format!("presign url for {}", key))
}

#[cfg(test)]
mod image_tests {
    use super::*;
    use crate::testing::fake_storage;

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("image/heic"), Some("heic"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[test]
    fn categorized_key_keeps_file_name() {
        let id = Uuid::nil();
        let staged = uncategorized_key("U42", id, "jpg");
        assert_eq!(
            staged,
            "retrain_images/uncategorized/U42_00000000-0000-0000-0000-000000000000.jpg"
        );
        assert_eq!(
            categorized_key(&staged, 7).unwrap(),
            "retrain_images/7/U42_00000000-0000-0000-0000-000000000000.jpg"
        );
        assert!(categorized_key("retrain_images/3/x.jpg", 7).is_err());
        assert!(categorized_key("retrain_images/uncategorized/", 7).is_err());
    }

    #[tokio::test]
    async fn stage_then_categorize_moves_the_object() {
        let (state, storage) = fake_storage();

        let key = stage_uncategorized(
            &state,
            "U1",
            UploadItem { body: Bytes::from_static(b"\xff\xd8jpeg"), content_type: "image/jpeg" },
        )
        .await
        .unwrap();
        assert!(key.starts_with("retrain_images/uncategorized/U1_"));
        assert!(storage.contains(&key));

        let dest = categorize(&state, &key, 3).await.unwrap();
        assert!(dest.starts_with("retrain_images/3/U1_"));
        assert!(!storage.contains(&key));
        assert!(storage.contains(&dest));

        let url = preview_url(&state, &dest).await.unwrap();
        assert!(url.contains(&dest));
    }

    #[tokio::test]
    async fn empty_upload_is_refused() {
        let (state, storage) = fake_storage();
        let res = stage_uncategorized(
            &state,
            "U1",
            UploadItem { body: Bytes::new(), content_type: "image/jpeg" },
        )
        .await;
        assert!(res.is_err());
        assert!(storage.keys().is_empty());
    }
}
