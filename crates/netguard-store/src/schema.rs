//! Relational schema.
//!
//! Enum columns hold the lowercase wire names. `severity_rank` mirrors
//! `Severity`'s ordering so minimum-severity filters stay in SQL.

pub const STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS organizations (
        id          UUID PRIMARY KEY,
        name        TEXT NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS network_devices (
        id               UUID PRIMARY KEY,
        organization_id  UUID NOT NULL REFERENCES organizations(id),
        ip_address       TEXT NOT NULL,
        mac_address      TEXT,
        hostname         TEXT,
        vendor           TEXT,
        os               TEXT,
        device_type      TEXT NOT NULL,
        status           TEXT NOT NULL,
        open_ports       JSONB NOT NULL DEFAULT '[]'::jsonb,
        risk_score       DOUBLE PRECISION NOT NULL DEFAULT 0,
        first_seen       TIMESTAMPTZ NOT NULL,
        last_seen        TIMESTAMPTZ NOT NULL
    )"#,
    r#"CREATE UNIQUE INDEX IF NOT EXISTS network_devices_org_ip
        ON network_devices (organization_id, ip_address)"#,
    r#"CREATE TABLE IF NOT EXISTS security_scans (
        id               UUID PRIMARY KEY,
        organization_id  UUID NOT NULL REFERENCES organizations(id),
        scan_type        TEXT NOT NULL,
        target           TEXT NOT NULL,
        profile          TEXT NOT NULL,
        status           TEXT NOT NULL,
        findings_count   BIGINT NOT NULL DEFAULT 0,
        devices_found    BIGINT NOT NULL DEFAULT 0,
        error            TEXT,
        created_at       TIMESTAMPTZ NOT NULL,
        started_at       TIMESTAMPTZ,
        completed_at     TIMESTAMPTZ,
        UNIQUE (organization_id, id)
    )"#,
    r#"CREATE INDEX IF NOT EXISTS security_scans_org_created
        ON security_scans (organization_id, created_at DESC)"#,
    r#"CREATE TABLE IF NOT EXISTS security_findings (
        id               UUID PRIMARY KEY,
        organization_id  UUID NOT NULL REFERENCES organizations(id),
        scan_id          UUID NOT NULL,
        device_id        UUID NOT NULL,
        severity         TEXT NOT NULL,
        severity_rank    SMALLINT NOT NULL,
        title            TEXT NOT NULL,
        description      TEXT NOT NULL,
        cve_id           TEXT,
        cvss_score       DOUBLE PRECISION,
        port             INTEGER,
        status           TEXT NOT NULL,
        created_at       TIMESTAMPTZ NOT NULL,
        FOREIGN KEY (organization_id, scan_id) REFERENCES security_scans (organization_id, id)
    )"#,
    r#"CREATE INDEX IF NOT EXISTS security_findings_org_rank
        ON security_findings (organization_id, severity_rank DESC, created_at DESC)"#,
    r#"CREATE TABLE IF NOT EXISTS anomalies (
        id               UUID PRIMARY KEY,
        organization_id  UUID NOT NULL REFERENCES organizations(id),
        device_id        UUID,
        anomaly_type     TEXT NOT NULL,
        severity         TEXT NOT NULL,
        severity_rank    SMALLINT NOT NULL,
        score            DOUBLE PRECISION NOT NULL,
        description      TEXT NOT NULL,
        status           TEXT NOT NULL,
        detected_at      TIMESTAMPTZ NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS anomalies_org_detected
        ON anomalies (organization_id, detected_at DESC)"#,
    r#"CREATE TABLE IF NOT EXISTS device_telemetry (
        id                BIGSERIAL PRIMARY KEY,
        organization_id   UUID NOT NULL REFERENCES organizations(id),
        device_id         UUID NOT NULL,
        observed_at       TIMESTAMPTZ NOT NULL,
        open_port_count   BIGINT NOT NULL,
        service_count     BIGINT NOT NULL,
        new_ports         BIGINT NOT NULL,
        closed_ports      BIGINT NOT NULL,
        risky_port_count  BIGINT NOT NULL,
        bytes_in          BIGINT NOT NULL DEFAULT 0,
        bytes_out         BIGINT NOT NULL DEFAULT 0,
        connection_count  BIGINT NOT NULL DEFAULT 0
    )"#,
    r#"CREATE INDEX IF NOT EXISTS device_telemetry_org_observed
        ON device_telemetry (organization_id, observed_at)"#,
];

/// Sort key stored alongside a severity.
pub fn severity_rank(severity: netguard_core::Severity) -> i16 {
    severity as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use netguard_core::Severity;

    #[test]
    fn rank_follows_severity_order() {
        assert!(severity_rank(Severity::Critical) > severity_rank(Severity::High));
        assert!(severity_rank(Severity::Low) > severity_rank(Severity::Info));
        assert_eq!(severity_rank(Severity::Info), 0);
    }

    #[test]
    fn every_statement_is_idempotent() {
        for statement in STATEMENTS {
            assert!(statement.contains("IF NOT EXISTS"), "{statement}");
        }
    }
}
