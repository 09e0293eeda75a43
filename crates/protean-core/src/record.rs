//! Records: data instances of an entity.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::entity::EntityDefinition;

/// Field name → value map of one record.
pub type ValueMap = serde_json::Map<String, serde_json::Value>;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
  #[default]
  Active,
  Inactive,
}

/// One stored document of a dynamic entity.
///
/// `version` starts at 1 and grows by exactly one per update. It is
/// advisory: updates do not compare it against a caller-supplied value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
  /// Storage row id.
  pub id:          i64,
  /// 128-bit random identifier, hex encoded; globally unique.
  pub record_id:   String,
  pub entity_id:   i64,
  pub entity_code: String,
  pub app_id:      i64,
  pub data:        ValueMap,
  pub version:     i64,
  pub status:      RecordStatus,
  pub properties:  Option<serde_json::Value>,
  pub created_by:  String,
  pub created_at:  DateTime<Utc>,
  pub updated_by:  String,
  pub updated_at:  DateTime<Utc>,
  pub deleted:     bool,
}

impl Record {
  /// Flatten into the row shape returned by queries: the field values plus
  /// `id` and the system attributes. A field `entity` declares under a
  /// system name keeps its own value.
  pub fn into_row(self, entity: &EntityDefinition) -> ValueMap {
    let system: [(&str, serde_json::Value); 5] = [
      ("id", self.record_id.into()),
      ("version", self.version.into()),
      ("status", self.status.as_ref().into()),
      ("created_at", timestamp(self.created_at).into()),
      ("updated_at", timestamp(self.updated_at).into()),
    ];
    let mut row = self.data;
    for (name, value) in system {
      if entity.field(name).is_none() {
        row.insert(name.into(), value);
      }
    }
    row
  }
}

/// Same rendering serde gives a `DateTime<Utc>`, so rows and records agree.
fn timestamp(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Target of a document insert.
#[derive(Debug, Clone)]
pub struct NewRecord {
  pub entity_id:   i64,
  pub entity_code: String,
  pub app_id:      i64,
  pub data:        ValueMap,
  pub actor:       String,
}

/// One page of rows plus, when requested, the total match count.
#[derive(Debug, Clone, Default)]
pub struct Page<T> {
  pub items: Vec<T>,
  pub total: Option<u64>,
}
