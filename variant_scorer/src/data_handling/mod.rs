pub mod reference_fasta;
pub mod variant_table;
