use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// `id` (upsert key), `tags` (`|key=value|...|` metadata for filtering) and
/// the fixed-size `vector` column.
pub fn build_vector_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("tags", DataType::Utf8, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}

pub fn encode_tags(tags: &[String]) -> String {
	let mut out = String::from("|");
	for t in tags {
		out.push_str(t);
		out.push('|');
	}
	out
}

pub fn decode_tags(encoded: &str) -> Vec<&str> {
	encoded.split('|').filter(|t| !t.is_empty()).collect()
}
