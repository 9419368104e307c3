// Esquema Diesel parcial: sólo las columnas que se leen o actualizan con el
// DSL. Las columnas de elemento de `formulas`, los fingerprints y las
// propiedades de `snapshots` se manejan con SQL renderizado.
use diesel::allow_tables_to_appear_in_same_query;
diesel::table! {
    formulas (id) {
        id -> BigInt,
        formula_string -> Text,
        molwt -> Double,
        atom_number -> Integer,
        molecule_number -> Integer,
        molecule_ids -> Text,
        commit_time -> Timestamp,
        update_time -> Timestamp,
    }
}
diesel::table! {
    molecules (id) {
        id -> BigInt,
        smiles -> Text,
        formula_id -> BigInt,
        snapshot_number -> Integer,
        snapshot_ids -> Text,
        commit_time -> Timestamp,
        update_time -> Timestamp,
    }
}
diesel::table! {
    snapshots (id) {
        id -> BigInt,
        hash_token -> Text,
        molecule_id -> BigInt,
        owner_id -> BigInt,
        commit_time -> Timestamp,
        update_time -> Timestamp,
    }
}
diesel::joinable!(molecules -> formulas (formula_id));
diesel::joinable!(snapshots -> molecules (molecule_id));
allow_tables_to_appear_in_same_query!(formulas, molecules, snapshots);
