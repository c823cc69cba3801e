//! Typed field access on merged records

use serde_json::Value;

use super::ProjectionError;
use crate::ingest::Record;
use crate::models::Entity;

/// Row position and entity, carried into error messages
#[derive(Debug, Clone, Copy)]
pub(crate) struct RowContext {
    pub entity: Entity,
    pub row: usize,
}

impl RowContext {
    pub fn new(entity: Entity, row: usize) -> Self {
        Self { entity, row }
    }

    fn missing(&self, field: &'static str) -> ProjectionError {
        ProjectionError::MissingField {
            entity: self.entity,
            row: self.row,
            field,
        }
    }

    fn invalid(&self, field: &'static str, expected: &'static str, value: &Value) -> ProjectionError {
        ProjectionError::InvalidValue {
            entity: self.entity,
            row: self.row,
            field,
            expected,
            value: value.to_string(),
        }
    }

    /// Text value; numbers and booleans are rendered, null reads as `None`
    pub fn optional_string(&self, record: &Record, field: &'static str) -> Option<String> {
        match record.get(field) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }

    pub fn required_string(
        &self,
        record: &Record,
        field: &'static str,
    ) -> Result<String, ProjectionError> {
        self.optional_string(record, field)
            .ok_or_else(|| self.missing(field))
    }

    /// Integer value, accepting numeric strings and integral floats
    pub fn optional_i64(
        &self,
        record: &Record,
        field: &'static str,
    ) -> Result<Option<i64>, ProjectionError> {
        let value = match record.get(field) {
            None | Some(Value::Null) => return Ok(None),
            Some(value) => value,
        };

        let parsed = match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };

        parsed
            .map(Some)
            .ok_or_else(|| self.invalid(field, "integer", value))
    }

    pub fn required_i64(&self, record: &Record, field: &'static str) -> Result<i64, ProjectionError> {
        self.optional_i64(record, field)?
            .ok_or_else(|| self.missing(field))
    }

    pub fn optional_i32(
        &self,
        record: &Record,
        field: &'static str,
    ) -> Result<Option<i32>, ProjectionError> {
        match self.optional_i64(record, field)? {
            None => Ok(None),
            Some(n) => i32::try_from(n)
                .map(Some)
                .map_err(|_| self.invalid(field, "32-bit integer", &Value::from(n))),
        }
    }

    pub fn required_i32(&self, record: &Record, field: &'static str) -> Result<i32, ProjectionError> {
        self.optional_i32(record, field)?
            .ok_or_else(|| self.missing(field))
    }

    pub fn optional_f64(
        &self,
        record: &Record,
        field: &'static str,
    ) -> Result<Option<f64>, ProjectionError> {
        let value = match record.get(field) {
            None | Some(Value::Null) => return Ok(None),
            Some(value) => value,
        };

        match value {
            Value::Number(n) => Ok(n.as_f64()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| self.invalid(field, "number", value)),
            _ => Err(self.invalid(field, "number", value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_numeric_strings_are_integers() {
        let ctx = RowContext::new(Entity::Users, 0);
        let row = record(json!({"userId": "39", "n": 7, "f": 12.0, "bad": "x"}));

        assert_eq!(ctx.required_i32(&row, "userId").unwrap(), 39);
        assert_eq!(ctx.required_i64(&row, "n").unwrap(), 7);
        assert_eq!(ctx.required_i64(&row, "f").unwrap(), 12);
        assert!(matches!(
            ctx.required_i64(&row, "bad"),
            Err(ProjectionError::InvalidValue { field: "bad", .. })
        ));
    }

    #[test]
    fn test_null_and_missing() {
        let ctx = RowContext::new(Entity::Songs, 3);
        let row = record(json!({"title": null}));

        assert_eq!(ctx.optional_string(&row, "title"), None);
        assert_eq!(ctx.optional_f64(&row, "duration").unwrap(), None);
        assert_eq!(
            ctx.required_string(&row, "song_id"),
            Err(ProjectionError::MissingField {
                entity: Entity::Songs,
                row: 3,
                field: "song_id"
            })
        );
    }

    #[test]
    fn test_numbers_render_as_strings() {
        let ctx = RowContext::new(Entity::SongPlays, 0);
        let row = record(json!({"sessionId": 583}));
        assert_eq!(ctx.required_string(&row, "sessionId").unwrap(), "583");
    }
}
