pub mod k8s_client;
pub mod test_app;
