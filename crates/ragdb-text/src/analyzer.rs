use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer, TokenStream};

const STOP_WORDS: &[&str] = &[
	"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
];

/// Normalizes text into index terms: splits on every non-alphanumeric char
/// (which strips punctuation) and case-folds. Optionally drops stop words.
///
/// The same analyzer must be used for chunks and queries.
#[derive(Clone)]
pub struct Analyzer {
	inner: TextAnalyzer,
}

impl Analyzer {
	pub fn new(stop_words: bool) -> Self {
		let base = TextAnalyzer::builder(SimpleTokenizer::default()).filter(LowerCaser);
		let inner = if stop_words {
			base.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| (*s).to_string()))).build()
		} else {
			base.build()
		};
		Self { inner }
	}

	pub fn analyze(&self, text: &str) -> Vec<String> {
		// token_stream needs &mut; the analyzer itself is cheap to clone.
		let mut analyzer = self.inner.clone();
		let mut stream = analyzer.token_stream(text);
		let mut tokens = Vec::new();
		while let Some(token) = stream.next() {
			tokens.push(token.text.clone());
		}
		tokens
	}
}

impl Default for Analyzer {
	fn default() -> Self {
		Self::new(false)
	}
}

impl std::fmt::Debug for Analyzer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Analyzer").finish_non_exhaustive()
	}
}
