pub mod agenda_archive;
