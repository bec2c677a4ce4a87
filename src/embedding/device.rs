use candle_core::Device;
use tracing::{debug, warn};

use super::error::EmbeddingError;

/// Selects the compute device for local models.
///
/// GPU backends are only attempted when the corresponding feature is
/// compiled in; an unavailable device degrades to the next option and
/// finally to CPU, which always succeeds.
pub fn select_device() -> Result<Device, EmbeddingError> {
    #[cfg(feature = "metal")]
    match Device::new_metal(0) {
        Ok(device) => {
            debug!("using Metal GPU acceleration");
            return Ok(device);
        }
        Err(e) => warn!(error = %e, "Metal device unavailable"),
    }

    #[cfg(feature = "cuda")]
    match Device::new_cuda(0) {
        Ok(device) => {
            debug!("using CUDA GPU acceleration");
            return Ok(device);
        }
        Err(e) => warn!(error = %e, "CUDA device unavailable"),
    }

    if cfg!(any(feature = "metal", feature = "cuda")) {
        warn!("no GPU device available, falling back to CPU");
    } else {
        debug!("no GPU backend compiled, using CPU");
    }
    Ok(Device::Cpu)
}
