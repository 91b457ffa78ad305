use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

use ragdb_core::terms::STOP_WORDS;

pub const TOKENIZER_NAME: &str = "text_with_stopwords";

#[derive(Debug, Clone, Copy)]
pub struct Fields {
	pub id: Field,
	pub text: Field,
	pub tags: Field,
}

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	let _id_field = schema_builder.add_text_field("id", STRING | STORED);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER_NAME).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing);
	let _text_field = schema_builder.add_text_field("text", text_options);
	// `key=value` metadata tags, one raw term each
	let _tags_field = schema_builder.add_text_field("tags", STRING);
	schema_builder.build()
}

pub fn fields(schema: &Schema) -> tantivy::Result<Fields> {
	Ok(Fields { id: schema.get_field("id")?, text: schema.get_field("text")?, tags: schema.get_field("tags")? })
}

/// Same rules as `ragdb_core::terms::tokenize`, so in-process query terms hit
/// the indexed terms.
pub fn register_tokenizer(index: &Index) {
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
		.build();
	index.tokenizers().register(TOKENIZER_NAME, tokenizer);
}
