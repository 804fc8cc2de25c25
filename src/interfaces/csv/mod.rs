pub mod invoice_writer;
pub mod seed_reader;
