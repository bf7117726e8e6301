//! Synchronization of bot metadata and the command menu with the remote service.
//!
//! Each configured field is read first and written only when the remote value
//! differs, so repeated starts issue no redundant writes.

use std::fmt;

use courier_core::{ApiResult, BotApi};
use courier_framework::CommandRegistry;
use tracing::{debug, info, warn};

use crate::config::BotCreationOptions;
use crate::error::{BotError, BotResult};

/// One piece of remotely stored bot metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    Name,
    Description,
    ShortDescription,
}

impl MetadataField {
    pub const ALL: [Self; 3] = [Self::Name, Self::Description, Self::ShortDescription];

    /// The configured value, if any.
    pub fn desired(self, options: &BotCreationOptions) -> Option<&str> {
        match self {
            Self::Name => options.name.as_deref(),
            Self::Description => options.description.as_deref(),
            Self::ShortDescription => options.short_description.as_deref(),
        }
    }

    /// Name of the API operation that writes this field.
    pub fn operation(self) -> &'static str {
        match self {
            Self::Name => "setMyName",
            Self::Description => "setMyDescription",
            Self::ShortDescription => "setMyShortDescription",
        }
    }

    async fn read(self, api: &dyn BotApi) -> ApiResult<String> {
        match self {
            Self::Name => api.get_my_name().await,
            Self::Description => api.get_my_description().await,
            Self::ShortDescription => api.get_my_short_description().await,
        }
    }

    async fn write(self, api: &dyn BotApi, value: &str) -> ApiResult<()> {
        match self {
            Self::Name => api.set_my_name(value).await,
            Self::Description => api.set_my_description(value).await,
            Self::ShortDescription => api.set_my_short_description(value).await,
        }
    }
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Name => "name",
            Self::Description => "description",
            Self::ShortDescription => "short_description",
        })
    }
}

/// What a metadata sync did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Fields that were written.
    pub written: Vec<MetadataField>,
    /// Fields whose remote value already matched.
    pub unchanged: Vec<MetadataField>,
    /// Fields skipped because the remote value could not be read.
    pub skipped: Vec<MetadataField>,
}

/// Brings the remote name, description and short description in line with
/// `options`.
///
/// Unconfigured fields are left alone. A failed write aborts the sync.
pub async fn sync_metadata(api: &dyn BotApi, options: &BotCreationOptions) -> BotResult<SyncReport> {
    let mut report = SyncReport::default();

    for field in MetadataField::ALL {
        let Some(desired) = field.desired(options) else {
            continue;
        };

        let current = match field.read(api).await {
            Ok(current) => current,
            Err(e) => {
                warn!(%field, error = %e, "Failed to read bot metadata, skipping");
                report.skipped.push(field);
                continue;
            }
        };

        if current == desired {
            debug!(%field, "Bot metadata up to date");
            report.unchanged.push(field);
            continue;
        }

        field
            .write(api, desired)
            .await
            .map_err(|e| BotError::api(field.operation(), e))?;
        info!(%field, "Bot metadata updated");
        report.written.push(field);
    }

    Ok(report)
}

/// Pushes the menu of validly named commands.
///
/// Returns the number of entries pushed; nothing is sent when there are none.
pub async fn sync_command_menu(api: &dyn BotApi, registry: &CommandRegistry) -> BotResult<usize> {
    let menu = registry.menu();
    if menu.is_empty() {
        debug!("No commands to publish, skipping menu sync");
        return Ok(0);
    }

    api.set_my_commands(&menu)
        .await
        .map_err(|e| BotError::api("setMyCommands", e))?;
    info!(count = menu.len(), "Command menu published");
    Ok(menu.len())
}
