//! Diffusion cadencée de l'audio brut vers le call leg
//!
//! Le pacer lit l'audio décodé frame par frame et écrit chaque frame
//! vers le sink, puis se suspend le temps de la frame : l'audio d'une
//! durée D est livré en D de temps mur (à une frame près), quelle que
//! soit la vitesse à laquelle le décodage l'a produit.
//!
//! La vivacité du sink est testée AVANT chaque écriture : un raccroché
//! interrompt la diffusion en une frame au plus, frame partielle
//! comprise. On ne pousse jamais d'audio vers un appel mort.

use std::time::Duration;

use pmocall::CallSink;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::sleep;
use tracing::debug;

/// Issue d'une diffusion de segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Fin de l'audio du segment atteinte.
    SegmentComplete,
    /// Le sink n'accepte plus d'audio ; fatal à la session, pas
    /// seulement au segment.
    SinkGone,
}

/// Diffuse `reader` vers `sink` en frames de `frame_size` octets.
///
/// Lit exactement `frame_size` octets par frame (moins en fin de flux),
/// écrit, puis dort `frame_duration`. Une erreur de lecture du flux
/// décodé remonte telle quelle (elle ne vaut ni fin de segment ni
/// disparition du sink).
pub async fn deliver<R, S>(
    reader: &mut R,
    frame_size: usize,
    frame_duration: Duration,
    sink: &S,
) -> std::io::Result<DeliveryOutcome>
where
    R: AsyncRead + Unpin + ?Sized,
    S: CallSink + ?Sized,
{
    if frame_size == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "frame size must be non-zero",
        ));
    }

    let mut frame = vec![0u8; frame_size];
    loop {
        if !sink.is_live() {
            debug!("sink no longer live, stopping delivery");
            return Ok(DeliveryOutcome::SinkGone);
        }

        let filled = read_frame(reader, &mut frame).await?;
        if filled == 0 {
            return Ok(DeliveryOutcome::SegmentComplete);
        }

        if let Err(e) = sink.write_audio(&frame[..filled]).await {
            debug!(error = %e, "sink rejected the frame, stopping delivery");
            return Ok(DeliveryOutcome::SinkGone);
        }

        sleep(frame_duration).await;
    }
}

/// Remplit `buf` autant que possible ; un retour < `buf.len()` signifie
/// fin de flux.
async fn read_frame<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
