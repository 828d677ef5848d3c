use tch::{Device, Kind, Tensor};

use crate::embedding::word2vec::Word2Vec;
use crate::tokenizer::vocab::Vocab;

/// Lookup table for the frozen embedding layer: row i holds the vector of id i.
/// Ids without a vector (0 included) get a zero row.
pub fn weight_matrix(embedding: &Word2Vec, vocab: &Vocab) -> Tensor {
    let dim = embedding.dim();
    let mut data = vec![0f32; vocab.len() * dim];
    for (id, c) in vocab.iter().skip(1) {
        if let Some(v) = embedding.vector(c.encode_utf8(&mut [0; 4])) {
            let row = id as usize * dim;
            data[row..row + dim].copy_from_slice(v);
        }
    }
    Tensor::of_slice(&data)
        .view([vocab.len() as i64, dim as i64])
        .to_kind(Kind::Float)
        .to_device(Device::Cpu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::word2vec::Word2VecConfig;

    fn embedding() -> Word2Vec {
        let sentences: Vec<Vec<String>> = ["好 棒 好 棒 好", "棒 好 啦 啦"]
            .iter()
            .map(|l| l.split(' ').map(str::to_string).collect())
            .collect();
        let config = Word2VecConfig {
            size: 4,
            min_count: 1,
            epochs: 2,
            ..Word2VecConfig::default()
        };
        Word2Vec::train(&sentences, &config).unwrap()
    }

    #[test]
    fn matrix_is_vocab_by_width() {
        let w2v = embedding();
        let vocab = Vocab::from_embedding(&w2v);
        assert_eq!(vocab.len(), 4);
        let m = weight_matrix(&w2v, &vocab);
        assert_eq!(m.size(), vec![4, 4]);
    }

    #[test]
    fn rows_follow_vocab_ids() {
        let w2v = embedding();
        let vocab = Vocab::from_embedding(&w2v);
        let m = weight_matrix(&w2v, &vocab);
        assert_eq!(vocab.char(1), '好');
        let expected = w2v.vector("好").unwrap();
        for (j, &v) in expected.iter().enumerate() {
            assert!((m.double_value(&[1, j as i64]) - v as f64).abs() < 1e-6);
        }
        let zero_row = m.get(0).abs().sum(Kind::Float).double_value(&[]);
        assert_eq!(zero_row, 0.0);
    }

    #[test]
    fn chars_missing_from_embedding_get_zero_rows() {
        let w2v = embedding();
        let vocab = Vocab::from_chars("好X棒".chars());
        let m = weight_matrix(&w2v, &vocab);
        assert_eq!(m.size(), vec![4, 4]);
        let missing = m.get(2).abs().sum(Kind::Float).double_value(&[]);
        assert_eq!(missing, 0.0);
        let present = m.get(1).abs().sum(Kind::Float).double_value(&[]);
        assert!(present > 0.0);
    }
}
