//! Backend abstraction - inference-only backends
//!
//! Supports CUDA (GPU) when the `cuda` feature is enabled and NdArray (CPU)
//! otherwise. Neither alias wraps `Autodiff`, so models built on them run in
//! inference mode: dropout is an identity and batch norm uses its running
//! statistics.

// --------------------------------------------------------------------------------
// BACKEND SELECTION: CUDA (opt-in) or NdArray (default)
// --------------------------------------------------------------------------------

#[cfg(feature = "cuda")]
pub type InferenceBackend = burn_cuda::Cuda;

#[cfg(not(feature = "cuda"))]
pub type InferenceBackend = burn_ndarray::NdArray;

/// Device type of the selected backend
pub type InferenceDevice = <InferenceBackend as burn::tensor::backend::Backend>::Device;

/// Get the default device
pub fn default_device() -> InferenceDevice {
    InferenceDevice::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(not(feature = "cuda"))]
    {
        "NdArray (CPU)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_name_is_set() {
        assert!(!backend_name().is_empty());
    }
}
