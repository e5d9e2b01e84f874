pub mod retry_request_reader;
pub mod transaction_report_writer;
pub mod wallet_writer;
