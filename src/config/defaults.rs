//! Default values for configuration

/// Default Qdrant gRPC URL for local development (port 6334, not 6333 REST)
pub fn default_qdrant_url() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
}

/// Default environment variable name for Qdrant API key
pub fn default_qdrant_api_key_env() -> String {
    "QDRANT_API_KEY".to_string()
}

/// Default collection name
pub fn default_collection_name() -> String {
    "video_frames".to_string()
}

/// Default feature vector dimension (8 x 8 x 8 histogram bins)
pub fn default_vector_dim() -> usize {
    512
}

/// Default hue bins
pub fn default_hue_bins() -> usize {
    8
}

/// Default saturation bins
pub fn default_saturation_bins() -> usize {
    8
}

/// Default value (brightness) bins
pub fn default_value_bins() -> usize {
    8
}

/// Default sampling interval: one frame per second
pub fn default_interval_secs() -> f64 {
    1.0
}

/// Default image format for sampled frames
pub fn default_frame_format() -> String {
    "jpg".to_string()
}

/// Default maximum upload size in MB
pub fn default_max_file_size_mb() -> u64 {
    500
}

/// Default allowed container formats (by extension)
pub fn default_supported_formats() -> Vec<String> {
    vec!["mp4".to_string(), "avi".to_string(), "mov".to_string()]
}

/// Default ingestion timeout (0 = no timeout)
pub fn default_ingest_timeout_secs() -> u64 {
    0
}

/// Default ffmpeg binary
pub fn default_ffmpeg_path() -> String {
    std::env::var("VIDSIM_FFMPEG").unwrap_or_else(|_| "ffmpeg".to_string())
}

/// Default ffprobe binary
pub fn default_ffprobe_path() -> String {
    std::env::var("VIDSIM_FFPROBE").unwrap_or_else(|_| "ffprobe".to_string())
}

/// Default number of results
pub fn default_query_k() -> usize {
    5
}

/// Maximum number of results allowed
pub fn default_query_max_k() -> usize {
    100
}
