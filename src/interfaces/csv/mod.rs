pub mod payments_writer;
