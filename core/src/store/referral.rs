use super::{get_enum, get_opt_ts, get_ts, roster::load_driver, ts, PayrollStore};
use crate::{
    error::{PayrollError, PayrollResult},
    referral::{
        AffiliateMember, AffiliateNetwork, InviteDecision, InviteStatus, ReferralInvite,
        ReferralRepository,
    },
    roster::Driver,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const INVITE_COLUMNS: &str =
    "code, referrer_id, status, issued_at, expires_at, accepted_by, accepted_at";

impl ReferralRepository for PayrollStore {
    fn insert_invite(&self, i: &ReferralInvite) -> PayrollResult<()> {
        self.conn.execute(
            "INSERT INTO referral_invite
             (code, referrer_id, status, issued_at, expires_at, accepted_by, accepted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                i.code,
                i.referrer_id,
                i.status.as_str(),
                ts(&i.issued_at),
                ts(&i.expires_at),
                i.accepted_by,
                i.accepted_at.as_ref().map(ts),
            ],
        )?;
        Ok(())
    }

    fn get_invite(&self, code: &str) -> PayrollResult<Option<ReferralInvite>> {
        load_invite(&self.conn, code)
    }

    fn redeem_invite<F>(&self, code: &str, decide: F) -> PayrollResult<ReferralInvite>
    where
        F: FnOnce(&ReferralInvite) -> InviteDecision,
    {
        // The expiry must be committed even though the caller gets an
        // error, so the outcome is carried out of the transaction.
        let outcome = self.write_tx(|conn| {
            let invite = load_invite(conn, code)?
                .ok_or_else(|| PayrollError::InviteNotFound { code: code.to_string() })?;

            match decide(&invite) {
                InviteDecision::Reject(e) => Err(e),
                InviteDecision::Expire => {
                    conn.execute(
                        "UPDATE referral_invite SET status = 'expired'
                         WHERE code = ?1 AND status = 'pending'",
                        params![code],
                    )?;
                    Ok(Err(PayrollError::InviteExpired { code: code.to_string() }))
                }
                InviteDecision::Accept { driver_id, at } => {
                    let changed = conn.execute(
                        "UPDATE referral_invite
                         SET status = 'accepted', accepted_by = ?2, accepted_at = ?3
                         WHERE code = ?1 AND status = 'pending'",
                        params![code, driver_id, ts(&at)],
                    )?;
                    if changed != 1 {
                        return Err(PayrollError::InviteAlreadyUsed { code: code.to_string() });
                    }

                    let linked = conn.execute(
                        "UPDATE driver SET referred_by = ?2
                         WHERE id = ?1 AND referred_by IS NULL",
                        params![driver_id, invite.referrer_id],
                    )?;
                    if linked != 1 {
                        return Err(PayrollError::InvalidReferral {
                            reason: format!("{driver_id} already belongs to a network"),
                        });
                    }

                    let active: bool = conn.query_row(
                        "SELECT status = 'active' FROM driver WHERE id = ?1",
                        params![driver_id],
                        |row| row.get(0),
                    )?;
                    conn.execute(
                        "INSERT INTO affiliate_network (referrer_id, total_recruited, active_recruited)
                         VALUES (?1, 0, 0)
                         ON CONFLICT(referrer_id) DO NOTHING",
                        params![invite.referrer_id],
                    )?;
                    conn.execute(
                        "INSERT INTO affiliate_member (referrer_id, driver_id, joined_at, active)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![invite.referrer_id, driver_id, ts(&at), active],
                    )?;
                    conn.execute(
                        "UPDATE affiliate_network
                         SET total_recruited = total_recruited + 1,
                             active_recruited = active_recruited + ?2
                         WHERE referrer_id = ?1",
                        params![invite.referrer_id, active as i64],
                    )?;

                    Ok(Ok(ReferralInvite {
                        status: InviteStatus::Accepted,
                        accepted_by: Some(driver_id),
                        accepted_at: Some(at),
                        ..invite
                    }))
                }
            }
        })?;
        outcome
    }

    fn network(&self, referrer_id: &str) -> PayrollResult<AffiliateNetwork> {
        load_network(&self.conn, referrer_id)
    }

    fn sync_network_activation(&self, referrer_id: &str) -> PayrollResult<AffiliateNetwork> {
        self.write_tx(|conn| {
            conn.execute(
                "UPDATE affiliate_member
                 SET active = (SELECT d.status = 'active' FROM driver d
                               WHERE d.id = affiliate_member.driver_id)
                 WHERE referrer_id = ?1",
                params![referrer_id],
            )?;
            conn.execute(
                "UPDATE affiliate_network
                 SET total_recruited = (SELECT COUNT(*) FROM affiliate_member m
                                        WHERE m.referrer_id = ?1),
                     active_recruited = (SELECT COUNT(*) FROM affiliate_member m
                                         WHERE m.referrer_id = ?1 AND m.active = 1)
                 WHERE referrer_id = ?1",
                params![referrer_id],
            )?;
            load_network(conn, referrer_id)
        })
    }

    fn find_driver(&self, driver_id: &str) -> PayrollResult<Option<Driver>> {
        load_driver(&self.conn, driver_id)
    }

    fn roster(&self) -> PayrollResult<Vec<Driver>> {
        self.drivers()
    }
}

fn load_invite(conn: &Connection, code: &str) -> PayrollResult<Option<ReferralInvite>> {
    let invite = conn
        .query_row(
            &format!("SELECT {INVITE_COLUMNS} FROM referral_invite WHERE code = ?1"),
            params![code],
            map_invite,
        )
        .optional()?;
    Ok(invite)
}

/// A referrer with no recruits yet gets an empty network.
fn load_network(conn: &Connection, referrer_id: &str) -> PayrollResult<AffiliateNetwork> {
    let counters: Option<(u32, u32)> = conn
        .query_row(
            "SELECT total_recruited, active_recruited FROM affiliate_network
             WHERE referrer_id = ?1",
            params![referrer_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let (total_recruited, active_recruited) = counters.unwrap_or((0, 0));

    let mut stmt = conn.prepare(
        "SELECT driver_id, joined_at, active FROM affiliate_member
         WHERE referrer_id = ?1
         ORDER BY joined_at ASC, driver_id ASC",
    )?;
    let members = stmt
        .query_map(params![referrer_id], |row| {
            Ok(AffiliateMember {
                driver_id: row.get(0)?,
                joined_at: get_ts(row, 1)?,
                active: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(AffiliateNetwork {
        referrer_id: referrer_id.to_string(),
        members,
        total_recruited,
        active_recruited,
    })
}

fn map_invite(row: &Row<'_>) -> rusqlite::Result<ReferralInvite> {
    Ok(ReferralInvite {
        code: row.get(0)?,
        referrer_id: row.get(1)?,
        status: get_enum(row, 2, InviteStatus::parse)?,
        issued_at: get_ts(row, 3)?,
        expires_at: get_ts(row, 4)?,
        accepted_by: row.get(5)?,
        accepted_at: get_opt_ts(row, 6)?,
    })
}
