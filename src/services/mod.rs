pub mod analyzer;
pub mod blob_store;
pub mod file_cache;
pub mod upload_service;

#[cfg(test)]
pub mod testing;
