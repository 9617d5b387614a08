pub mod mock_services;
pub mod test_data;
