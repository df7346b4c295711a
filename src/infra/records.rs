//! Single-row, single-column updates over the PostgREST surface.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

use crate::domain::types::RecordUpdate;
use crate::infra::supabase::SupabaseClient;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("no row in `{table}` matched {column} = {value}")]
    RowNotFound {
        table: String,
        column: String,
        value: String,
    },
    #[error("update of `{table}.{column}` failed: {reason}")]
    Update {
        table: String,
        column: String,
        reason: String,
    },
    #[error("record request failed: {0}")]
    Transport(String),
}

/// Relational-store adapter for persisting artifact URLs.
pub struct RecordStore {
    client: SupabaseClient,
}

impl RecordStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Write `value` into the row's column. A row that does not match is a
    /// reported failure; nothing is retried.
    pub async fn update_column(
        &self,
        update: &RecordUpdate,
        value: &str,
    ) -> Result<(), RecordError> {
        let mut url = self.client.endpoint(&["rest", "v1", &update.table]);
        url.query_pairs_mut().append_pair(
            &update.primary_key_column,
            &format!("eq.{}", update.primary_key_value),
        );

        let mut body = Map::new();
        body.insert(update.column.clone(), Value::String(value.to_string()));

        let response = self
            .client
            .http()
            .patch(url)
            .header("Prefer", "return=representation")
            .json(&Value::Object(body))
            .send()
            .await
            .map_err(|err| RecordError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(RecordError::Update {
                table: update.table.clone(),
                column: update.column.clone(),
                reason: format!("{status}: {detail}"),
            });
        }

        let rows: Value = response
            .json()
            .await
            .map_err(|err| RecordError::Transport(err.to_string()))?;
        match rows.as_array() {
            Some(rows) if !rows.is_empty() => {
                info!(
                    target: "cartolina::records",
                    table = %update.table,
                    column = %update.column,
                    key = %update.primary_key_value,
                    "record updated"
                );
                Ok(())
            }
            _ => Err(RecordError::RowNotFound {
                table: update.table.clone(),
                column: update.primary_key_column.clone(),
                value: update.primary_key_value.clone(),
            }),
        }
    }
}
