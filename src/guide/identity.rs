//! Mapping between stored channel ids and the guide's channel ids (`tvg-id`).
use std::collections::HashMap;

use crate::models::Channel;

/// The join key between a stored channel and the guide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelIdentity {
    pub internal_id: i64,
    pub external_id: Option<String>,
}

impl From<&Channel> for ChannelIdentity {
    fn from(channel: &Channel) -> Self {
        Self {
            internal_id: channel.id,
            external_id: channel.tvg_id.clone(),
        }
    }
}

/// Bidirectional id map, rebuilt from the full channel list for every request.
///
/// Channels without a guide id never appear in either direction.
#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    id_to_external: HashMap<i64, String>,
    external_to_id: HashMap<String, i64>,
}

impl IdentityMap {
    pub fn build(channels: impl IntoIterator<Item = ChannelIdentity>) -> Self {
        let mut map = Self::default();
        for channel in channels {
            let Some(external) = channel.external_id.filter(|id| !id.trim().is_empty()) else {
                continue;
            };
            map.id_to_external.insert(channel.internal_id, external.clone());
            map.external_to_id.insert(external, channel.internal_id);
        }
        map
    }

    pub fn external_id(&self, internal_id: i64) -> Option<&str> {
        self.id_to_external.get(&internal_id).map(String::as_str)
    }

    pub fn internal_id(&self, external_id: &str) -> Option<i64> {
        self.external_to_id.get(external_id).copied()
    }

    /// Guide ids for the requested channels, in request order. Unknown ids and
    /// channels without a guide id are dropped.
    pub fn external_ids_for(&self, internal_ids: &[i64]) -> Vec<String> {
        internal_ids
            .iter()
            .filter_map(|id| self.id_to_external.get(id).cloned())
            .collect()
    }

    pub fn external_to_internal(&self) -> &HashMap<String, i64> {
        &self.external_to_id
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_external.is_empty()
    }
}
