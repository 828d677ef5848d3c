use std::collections::HashMap;

use crate::embedding::word2vec::Word2Vec;

/// Id shared by space and every character the embedding does not know.
pub const UNK_ID: i64 = 0;
pub const UNK_CHAR: char = ' ';

/// Character <-> id mapping ordered by descending corpus frequency.
#[derive(Debug, Clone)]
pub struct Vocab {
    char_to_id: HashMap<char, i64>,
    id_to_char: Vec<char>,
}

impl Vocab {
    /// Ids 1..=n follow the embedding's count order, id 0 is space.
    pub fn from_embedding(embedding: &Word2Vec) -> Self {
        Self::from_chars(embedding.entries().iter().filter_map(|e| {
            let mut chars = e.token.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(c),
                _ => None,
            }
        }))
    }

    /// Builds a vocab from characters already in frequency order.
    pub fn from_chars(chars: impl IntoIterator<Item = char>) -> Self {
        let mut id_to_char = vec![UNK_CHAR];
        let mut char_to_id = HashMap::new();
        char_to_id.insert(UNK_CHAR, UNK_ID);
        for c in chars {
            if char_to_id.contains_key(&c) {
                continue;
            }
            let ix = id_to_char.len() as i64;
            id_to_char.push(c);
            char_to_id.insert(c, ix);
        }
        Self {
            char_to_id,
            id_to_char,
        }
    }

    pub fn len(&self) -> usize {
        self.id_to_char.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_char.len() <= 1
    }

    pub fn id(&self, c: char) -> i64 {
        self.char_to_id.get(&c).copied().unwrap_or(UNK_ID)
    }

    pub fn char(&self, id: i64) -> char {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.id_to_char.get(i).copied())
            .unwrap_or(UNK_CHAR)
    }

    /// Iterates `(id, char)` pairs in id order, starting with the reserved id 0.
    pub fn iter(&self) -> impl Iterator<Item = (i64, char)> + '_ {
        self.id_to_char.iter().enumerate().map(|(i, &c)| (i as i64, c))
    }

    pub fn encode(&self, text: &str) -> Vec<i64> {
        text.chars().map(|c| self.id(c)).collect()
    }

    pub fn decode(&self, ids: &[i64]) -> String {
        ids.iter().map(|&id| self.char(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_zero_is_space_and_unknowns() {
        let vocab = Vocab::from_chars("的我a".chars());
        assert_eq!(vocab.len(), 4);
        assert_eq!(vocab.id(' '), 0);
        assert_eq!(vocab.char(0), ' ');
        assert_eq!(vocab.id('z'), 0);
        assert_eq!(vocab.id('的'), 1);
        assert_eq!(vocab.id('a'), 3);
    }

    #[test]
    fn decode_maps_unknown_ids_to_space() {
        let vocab = Vocab::from_chars("ab".chars());
        assert_eq!(vocab.decode(&[1, 2, 0, 9, -1]), "ab   ");
    }

    #[test]
    fn encode_replaces_unseen_chars() {
        let vocab = Vocab::from_chars("好棒".chars());
        assert_eq!(vocab.encode("好 x棒"), vec![1, 0, 0, 2]);
    }

    #[test]
    fn duplicates_and_space_keep_first_id() {
        let vocab = Vocab::from_chars("a ba".chars());
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.id('b'), 2);
        let ids: Vec<i64> = vocab.iter().map(|(i, _)| i).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn empty_vocab_still_has_reserved_id() {
        let vocab = Vocab::from_chars(std::iter::empty());
        assert!(vocab.is_empty());
        assert_eq!(vocab.len(), 1);
        assert_eq!(vocab.decode(&[0]), " ");
    }
}
