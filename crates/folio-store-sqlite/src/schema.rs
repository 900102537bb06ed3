//! SQL schema for the Folio SQLite store.
//!
//! Executed once at connection startup. Column names follow the catalog's
//! naming convention (attribute `publicationType` → column
//! `publication_type`); the catalog does not generate DDL, so the two must
//! be kept in step.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    mail      TEXT NOT NULL UNIQUE,
    name      TEXT NOT NULL,
    disabled  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS editions (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    title         TEXT NOT NULL,
    creator       INTEGER REFERENCES users(id) ON DELETE SET NULL,
    creation      TEXT,            -- RFC 3339 UTC
    modification  TEXT             -- stamped on every change beneath
);

CREATE TABLE IF NOT EXISTS manifests (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    edition  INTEGER NOT NULL REFERENCES editions(id) ON DELETE CASCADE,
    title    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS transcriptions (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    edition  INTEGER NOT NULL REFERENCES editions(id) ON DELETE CASCADE,
    title    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS outlines (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    edition  INTEGER NOT NULL REFERENCES editions(id) ON DELETE CASCADE,
    title    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS publications (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    edition           INTEGER NOT NULL REFERENCES editions(id) ON DELETE CASCADE,
    title             TEXT NOT NULL,
    publication_type  TEXT NOT NULL,   -- 'PDF' | 'TEI' | 'OAC' | 'XML' | 'DYNAMIC'
    creator           INTEGER REFERENCES users(id) ON DELETE SET NULL,
    creation          TEXT,
    modification      TEXT
);

CREATE TABLE IF NOT EXISTS sections (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    publication   INTEGER NOT NULL REFERENCES publications(id) ON DELETE CASCADE,
    title         TEXT NOT NULL,
    \"index\"       INTEGER NOT NULL,
    section_type  TEXT NOT NULL,
    template      TEXT
);

CREATE TABLE IF NOT EXISTS rules (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    section    INTEGER NOT NULL REFERENCES sections(id) ON DELETE CASCADE,
    rule_type  TEXT NOT NULL,
    selector   TEXT NOT NULL,
    action     TEXT
);

CREATE TABLE IF NOT EXISTS section_sources (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    section  INTEGER NOT NULL REFERENCES sections(id) ON DELETE CASCADE,
    outline  TEXT NOT NULL,        -- 'outline/<id>'
    \"index\"  INTEGER NOT NULL
);

-- Polymorphic grants. Not cascaded: rows are deleted with their target
-- explicitly. User 0 is the public sentinel and has no users row.
CREATE TABLE IF NOT EXISTS permissions (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    target_type  TEXT NOT NULL,    -- 'EDITION' | 'MANIFEST' | 'TRANSCRIPTION' | 'PUBLICATION'
    target       INTEGER NOT NULL,
    \"user\"       INTEGER NOT NULL,
    role         TEXT NOT NULL,
    UNIQUE (target_type, target, \"user\")
);

-- Named advisory locks. A row is held from acquisition until its guarded
-- section commits or rolls back.
CREATE TABLE IF NOT EXISTS advisory_locks (
    name         TEXT PRIMARY KEY,
    holder       TEXT NOT NULL,
    acquired_at  INTEGER NOT NULL  -- unix milliseconds
);

CREATE INDEX IF NOT EXISTS publications_edition_idx ON publications(edition);
CREATE INDEX IF NOT EXISTS sections_publication_idx ON sections(publication);
CREATE INDEX IF NOT EXISTS rules_section_idx        ON rules(section);
CREATE INDEX IF NOT EXISTS sources_section_idx      ON section_sources(section);
CREATE INDEX IF NOT EXISTS outlines_edition_idx     ON outlines(edition);

PRAGMA user_version = 1;
";
