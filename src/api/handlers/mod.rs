mod files;
mod folders;
mod health;

use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::api::response::{ApiError, JSendPaginated, Pagination};

pub use files::{create_file, delete_file, download_file, get_file, list_files, update_file};
pub use folders::{
    create_folder, delete_folder, export_folder, get_folder, list_folders, update_folder,
};
pub use health::health;

fn default_limit() -> u32 {
    20
}

/// Distinguishes between a missing field (`None`) and an explicit `null` (`Some(None)`).
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: DeserializeOwned,
    D: Deserializer<'de>,
{
    Ok(Some(Option::deserialize(deserializer)?))
}

/// Slice one page out of `items`, converting only the records on that page.
fn paginate<T, R, F>(
    items: &[T],
    limit: u32,
    offset: u32,
    to_response: F,
) -> Result<Json<JSendPaginated<R>>, ApiError>
where
    R: Serialize,
    F: FnMut(&T) -> Result<R, ApiError>,
{
    if limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than 0"));
    }

    let page = items
        .iter()
        .skip(offset as usize)
        .take(limit as usize)
        .map(to_response)
        .collect::<Result<Vec<R>, ApiError>>()?;

    Ok(JSendPaginated::success(
        page,
        Pagination {
            limit,
            offset,
            total: items.len() as u64,
        },
    ))
}
