pub mod kv_repository;
