//! Charset handling and greedy CTC decoding for classification models.
//!
//! Model output is a `[steps, classes]` score matrix in row-major order.
//! Class 0 is the CTC blank.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::EngineError;

/// Class index → output string table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charset {
    symbols: Vec<String>,
}

impl Charset {
    pub fn new(symbols: Vec<String>) -> Result<Self, EngineError> {
        if symbols.len() < 2 {
            return Err(EngineError::Charset(format!(
                "expected the blank plus at least one symbol, got {} entries",
                symbols.len()
            )));
        }
        Ok(Self { symbols })
    }

    /// Parse a charset file: either a bare JSON array or an object with a
    /// `charset` array (the layout exported alongside custom models).
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum CharsetFile {
            Bare(Vec<String>),
            Wrapped { charset: Vec<String> },
        }

        let parsed: CharsetFile =
            serde_json::from_str(json).map_err(|e| EngineError::Charset(e.to_string()))?;
        match parsed {
            CharsetFile::Bare(symbols) | CharsetFile::Wrapped { charset: symbols } => {
                Self::new(symbols)
            }
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Greedy CTC decode: best class per step, collapse repeats, drop blanks.
pub fn greedy_decode(scores: &[f32], classes: usize, charset: &Charset) -> String {
    let mut text = String::new();
    let mut last = 0usize;

    for row in scores.chunks_exact(classes) {
        let best = argmax(row);
        if best == last {
            continue;
        }
        last = best;
        if best != 0 {
            if let Some(symbol) = charset.symbols.get(best) {
                text.push_str(symbol);
            }
        }
    }

    text
}

/// Softmax applied independently to every step
pub fn softmax_rows(scores: &[f32], classes: usize) -> Vec<Vec<f32>> {
    scores
        .chunks_exact(classes)
        .map(|row| {
            let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let exps: Vec<f32> = row.iter().map(|s| (s - max).exp()).collect();
            let sum: f32 = exps.iter().sum();
            exps.into_iter().map(|e| e / sum).collect()
        })
        .collect()
}

/// Probability-mode payload: `{"charsets": [...], "probability": [[...]]}`
pub fn probability_map(scores: &[f32], classes: usize, charset: &Charset) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(
        "charsets".to_string(),
        Value::from(charset.symbols.clone()),
    );
    map.insert(
        "probability".to_string(),
        Value::from(softmax_rows(scores, classes)),
    );
    map
}

fn argmax(row: &[f32]) -> usize {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (idx, &score) in row.iter().enumerate() {
        if score > best_score {
            best = idx;
            best_score = score;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> Charset {
        Charset::new(vec!["".into(), "a".into(), "b".into(), "c".into()]).unwrap()
    }

    fn one_hot(classes: &[usize], width: usize) -> Vec<f32> {
        classes
            .iter()
            .flat_map(|&c| (0..width).map(move |i| if i == c { 5.0 } else { 0.0 }))
            .collect()
    }

    #[test]
    fn test_collapses_repeats_and_drops_blank() {
        let scores = one_hot(&[1, 1, 0, 1, 2, 2, 0, 0, 3], 4);
        assert_eq!(greedy_decode(&scores, 4, &abc()), "aabc");
    }

    #[test]
    fn test_all_blank_is_empty() {
        let scores = one_hot(&[0, 0, 0], 4);
        assert_eq!(greedy_decode(&scores, 4, &abc()), "");
    }

    #[test]
    fn test_leading_symbol_kept() {
        let scores = one_hot(&[2, 0], 4);
        assert_eq!(greedy_decode(&scores, 4, &abc()), "b");
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let rows = softmax_rows(&[1.0, 2.0, 3.0, 0.0, 0.0, 0.0], 3);
        assert_eq!(rows.len(), 2);
        for row in &rows {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
        assert!(rows[0][2] > rows[0][1] && rows[0][1] > rows[0][0]);
        assert!((rows[1][0] - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_probability_map_shape() {
        let scores = one_hot(&[1, 3], 4);
        let map = probability_map(&scores, 4, &abc());
        assert_eq!(map["charsets"].as_array().unwrap().len(), 4);
        let probs = map["probability"].as_array().unwrap();
        assert_eq!(probs.len(), 2);
        assert_eq!(probs[0].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_charset_formats() {
        let bare = Charset::from_json(r#"["", "x", "y"]"#).unwrap();
        let wrapped = Charset::from_json(r#"{"charset": ["", "x", "y"], "word": false}"#).unwrap();
        assert_eq!(bare, wrapped);
        assert_eq!(bare.len(), 3);
    }

    #[test]
    fn test_charset_rejects_degenerate() {
        assert!(Charset::from_json(r#"[""]"#).is_err());
        assert!(Charset::from_json(r#"{"symbols": []}"#).is_err());
        assert!(Charset::from_json("nope").is_err());
    }
}
