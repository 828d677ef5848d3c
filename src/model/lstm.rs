use tch::nn::{self, Module, RNN};
use tch::{Kind, Tensor};

/// Frozen embedding -> LSTM -> dense logits over the vocabulary.
///
/// The recurrent state survives between `forward` calls, so consecutive batches
/// continue where the previous one stopped. Gradients do not flow across calls.
pub struct CharLstm {
    embedding: Tensor,
    lstm: nn::LSTM,
    dense: nn::Linear,
    vocab_size: i64,
    state: Option<nn::LSTMState>,
}

impl CharLstm {
    /// Builds the network under `path`; the embedding table is copied from `weights`
    /// and excluded from the optimizer.
    pub fn new(path: &nn::Path, weights: &Tensor, lstm_units: i64) -> Self {
        let (vocab_size, embedding_dim) = (weights.size()[0], weights.size()[1]);
        let mut embedding = (path / "embedding").zeros_no_train("weight", &[vocab_size, embedding_dim]);
        tch::no_grad(|| {
            embedding.copy_(&weights.to_device(embedding.device()));
        });
        let lstm = nn::lstm(path / "lstm", embedding_dim, lstm_units, Default::default());
        let dense = nn::linear(path / "dense", lstm_units, vocab_size, Default::default());
        Self {
            embedding,
            lstm,
            dense,
            vocab_size,
            state: None,
        }
    }

    pub fn reset_states(&mut self) {
        self.state = None;
    }

    /// `xs` is `[batch, seq]` of ids; returns `[batch, seq, vocab]` logits.
    pub fn forward(&mut self, xs: &Tensor) -> Tensor {
        let batch = xs.size()[0];
        let state = match self.state.take() {
            Some(s) if s.h().size()[1] == batch => s,
            _ => self.lstm.zero_state(batch),
        };
        let embedded = Tensor::embedding(&self.embedding, xs, -1, false, false);
        let (out, next) = self.lstm.seq_init(&embedded, &state);
        self.state = Some(nn::LSTMState((next.h().detach(), next.c().detach())));
        self.dense.forward(&out)
    }

    /// Sparse categorical cross-entropy from logits, averaged over every position.
    pub fn loss(&self, logits: &Tensor, targets: &Tensor) -> Tensor {
        logits
            .view([-1, self.vocab_size])
            .cross_entropy_for_logits(&targets.view([-1]).to_kind(Kind::Int64))
    }
}
