use tch::{Device, Kind, Tensor};

use crate::model::lstm::CharLstm;
use crate::tokenizer::vocab::{Vocab, UNK_ID};

/// Draws one id from the categorical distribution given by the logits of the last step.
fn sample_next(logits: &Tensor) -> i64 {
    let last = logits.select(1, -1);
    last.softmax(-1, Kind::Float)
        .multinomial(1, true)
        .int64_value(&[0, 0])
}

/// Continues `seed` by `n_char` sampled characters, feeding each prediction back in.
/// Characters of `seed` unknown to `vocab` are fed as id 0.
pub fn generate_seq(
    model: &mut CharLstm,
    vocab: &Vocab,
    seed: &str,
    n_char: usize,
    device: Device,
) -> String {
    model.reset_states();
    let mut input_eval = vocab.encode(seed);
    if input_eval.is_empty() {
        input_eval.push(UNK_ID);
    }

    let mut generated = Vec::with_capacity(n_char);
    tch::no_grad(|| {
        let mut xs = Tensor::of_slice(&input_eval).view([1, -1]).to_device(device);
        for _ in 0..n_char {
            let logits = model.forward(&xs);
            let predicted_id = sample_next(&logits);
            generated.push(predicted_id);
            xs = Tensor::of_slice(&[predicted_id]).view([1, 1]).to_device(device);
        }
    });

    let mut result = seed.to_string();
    result.push_str(&vocab.decode(&generated));
    result
}
