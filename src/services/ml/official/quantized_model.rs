//! Simple quantized model implementation for SmolLM3 with Candle v0.9.1

use candle_core::quantized::QTensor;
use candle_core::{Device, Result, Tensor};
use std::collections::HashMap;
use super::config::SmolLM3Config;

/// A simple quantized SmolLM3 model that directly uses QTensors
pub struct QuantizedSmolLM3 {
    tensors: HashMap<String, QTensor>,
    config: SmolLM3Config,
    device: Device,
    // Cache for KV attention
    kv_cache: Vec<Option<(Tensor, Tensor)>>,
}

impl QuantizedSmolLM3 {
    /// Create from loaded GGUF tensors
    pub fn new(
        tensors: HashMap<String, QTensor>,
        config: SmolLM3Config,
        device: Device,
    ) -> Result<Self> {
        // Initialize KV cache
        let kv_cache = vec![None; config.base.num_hidden_layers];
        
        Ok(Self {
            tensors,
            config,
            device,
            kv_cache,
        })
    }
    
    /// Get a tensor by name and dequantize it
    fn get_tensor(&self, name: &str) -> Result<Tensor> {
        self.tensors
            .get(name)
            .ok_or_else(|| candle_core::Error::Msg(format!("Tensor {} not found", name)))
            .and_then(|qt| qt.dequantize(&self.device))
    }
    
    /// Simple forward pass for generation
    pub fn forward(&mut self, input_ids: &Tensor, _position: usize) -> Result<Tensor> {
        let _seq_len = input_ids.dim(1)?;
        let _hidden_size = self.config.base.hidden_size;
        
        // 1. Token embedding
        let embed_tokens = self.get_tensor("model.embed_tokens.weight")?;
        let mut hidden_states = embed_tokens.index_select(input_ids, 0)?;
        
        // 2. Pass through layers
        for layer_idx in 0..self.config.base.num_hidden_layers {
            hidden_states = self.forward_layer(
                &hidden_states,
                layer_idx,
                _position,
            )?;
        }
        
        // 3. Final layer norm
        let norm_weight = self.get_tensor("model.norm.weight")?;
        hidden_states = self.rms_norm(&hidden_states, &norm_weight)?;
        
        // 4. Language model head
        let lm_head = self.get_tensor("lm_head.weight")?;
        let logits = hidden_states.matmul(&lm_head.t()?)?;
        
        Ok(logits)
    }
    
    /// Forward pass through a single transformer layer
    fn forward_layer(
        &mut self,
        hidden_states: &Tensor,
        layer_idx: usize,
        _position: usize,
    ) -> Result<Tensor> {
        let layer_prefix = format!("model.layers.{}", layer_idx);
        
        // Input layer norm
        let input_norm = self.get_tensor(&format!("{}.input_layernorm.weight", layer_prefix))?;
        let normed = self.rms_norm(hidden_states, &input_norm)?;
        
        // Self-attention
        let q_proj = self.get_tensor(&format!("{}.self_attn.q_proj.weight", layer_prefix))?;
        let k_proj = self.get_tensor(&format!("{}.self_attn.k_proj.weight", layer_prefix))?;
        let v_proj = self.get_tensor(&format!("{}.self_attn.v_proj.weight", layer_prefix))?;
        let o_proj = self.get_tensor(&format!("{}.self_attn.o_proj.weight", layer_prefix))?;
        
        let q = normed.matmul(&q_proj.t()?)?;
        let k = normed.matmul(&k_proj.t()?)?;
        let v = normed.matmul(&v_proj.t()?)?;
        
        // Simple attention (without proper reshaping for now)
        let attn_output = self.simple_attention(&q, &k, &v, layer_idx)?;
        let attn_output = attn_output.matmul(&o_proj.t()?)?;
        
        // Residual connection
        let hidden_states = (hidden_states + attn_output)?;
        
        // Post-attention layer norm
        let post_norm = self.get_tensor(&format!("{}.post_attention_layernorm.weight", layer_prefix))?;
        let normed = self.rms_norm(&hidden_states, &post_norm)?;
        
        // Feed-forward network
        let gate_proj = self.get_tensor(&format!("{}.mlp.gate_proj.weight", layer_prefix))?;
        let up_proj = self.get_tensor(&format!("{}.mlp.up_proj.weight", layer_prefix))?;
        let down_proj = self.get_tensor(&format!("{}.mlp.down_proj.weight", layer_prefix))?;
        
        let gate_output = normed.matmul(&gate_proj.t()?)?;
        let gate_output = gate_output.silu()?; // Use built-in silu in Candle 0.9.1
        let up_output = normed.matmul(&up_proj.t()?)?;
        let mlp_output = (gate_output * up_output)?;
        let mlp_output = mlp_output.matmul(&down_proj.t()?)?;
        
        // Final residual
        Ok((hidden_states + mlp_output)?)
    }
    
    /// Simple attention mechanism (placeholder)
    fn simple_attention(&mut self, _q: &Tensor, _k: &Tensor, v: &Tensor, _layer_idx: usize) -> Result<Tensor> {
        // For now, just return v as a placeholder
        // Real implementation would do proper attention with KV cache
        Ok(v.clone())
    }
    
    /// RMS normalization
    fn rms_norm(&self, x: &Tensor, weight: &Tensor) -> Result<Tensor> {
        let eps = 1e-6;
        let x2 = x.sqr()?;
        let mean = x2.mean_keepdim(2)?;
        let rrms = (mean + eps)?.recip()?.sqrt()?;
        Ok((x * rrms)?.broadcast_mul(weight)?)
    }
    
    /// Sample next token from logits
    pub fn sample(&self, logits: &Tensor, temperature: f32) -> Result<u32> {
        let logits = if temperature > 0.0 {
            (logits / temperature as f64)?
        } else {
            logits.clone()
        };
        
        let probs = candle_nn::ops::softmax_last_dim(&logits)?;
        let probs_vec: Vec<f32> = probs.to_vec1()?;
        
        // Simple sampling - just take argmax for now
        let mut max_idx = 0;
        let mut max_val = probs_vec[0];
        for (idx, &val) in probs_vec.iter().enumerate() {
            if val > max_val {
                max_val = val;
                max_idx = idx;
            }
        }
        
        Ok(max_idx as u32)
    }
}
